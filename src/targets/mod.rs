/// Target profiles and per-target shot handling
///
/// Each target face is a versioned profile (canonical image, zone mask, ring
/// table). The registry maps detector-reported names to handlers; misses and
/// unprocessable shots share a single handler.

pub mod handler;
pub mod profile;
pub mod registry;

pub use handler::{MissHandler, RingTarget, ShotKind, ShotReport, TargetHandler};
pub use profile::{ProfileManifest, TargetProfile};
pub use registry::TargetRegistry;
