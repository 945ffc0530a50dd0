//! Automated target scoring
//!
//! Captures frames, waits for a trigger, locates the target face the shooter
//! aimed at, registers it onto a canonical reference, scores the impact by
//! ring and reports the annotated result to a remote server.

pub mod app;
pub mod audio;
pub mod capture;
pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod messaging;
pub mod network;
pub mod pipeline;
pub mod registration;
pub mod scoring;
pub mod state;
pub mod targets;
pub mod trigger;
pub mod utils;
