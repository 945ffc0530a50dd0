/// Shot processing pipeline
///
/// ```text
/// processing queue ─▶ detect ─▶ classify ─▶ target handler ─▶ encode ─▶ result queue
/// ```

pub mod annotate;
pub mod job;
pub mod worker;

pub use job::ProcessingJob;
pub use worker::{ProcessedShot, ProcessingWorker, WorkerSettings};
