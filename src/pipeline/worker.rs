use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::annotate::{draw_marker, draw_rectangle, encode_jpeg, Marker, YELLOW};
use super::job::ProcessingJob;
use crate::detection::{classify, Detector, Hit, HitResult};
use crate::error::EncodeError;
use crate::messaging::{Event, EventBus};
use crate::network::{ResultPayload, ResultQueue};
use crate::state::SharedState;
use crate::targets::{ShotKind, TargetRegistry};
use crate::utils::{micros_since, spawn_named, LatencyStats, StageTiming};

/// Quality of the annotated image uploaded with every result
pub const RESULT_JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub confidence_threshold: f32,
    pub poll_interval: Duration,
    /// Frame / crop / warped crop of every hit are written here when set
    pub debug_dir: Option<PathBuf>,
}

/// Outcome of one job, before it is queued for upload
#[derive(Debug, Clone)]
pub struct ProcessedShot {
    pub payload: ResultPayload,
    pub kind: ShotKind,
    pub timing: StageTiming,
}

/// Turns processing jobs into result payloads, one job at a time.
///
/// Every job runs inside its own failure boundary: an error or a panic
/// while handling one shot is logged and the worker moves on.
pub struct ProcessingWorker {
    detector: Arc<dyn Detector>,
    registry: Arc<TargetRegistry>,
    results: ResultQueue,
    state: Arc<SharedState>,
    event_bus: EventBus,
    settings: WorkerSettings,
    stats: LatencyStats,
}

impl ProcessingWorker {
    pub fn new(
        detector: Arc<dyn Detector>,
        registry: Arc<TargetRegistry>,
        results: ResultQueue,
        state: Arc<SharedState>,
        event_bus: EventBus,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            detector,
            registry,
            results,
            state,
            event_bus,
            settings,
            stats: LatencyStats::new(),
        }
    }

    /// Detect, classify, hand off to the target handler and encode.
    pub fn process(&self, job: &ProcessingJob) -> Result<ProcessedShot, EncodeError> {
        let started = Instant::now();
        let mut timing = StageTiming::default();
        let aim = job.aim_point();

        let detections = self
            .detector
            .detect(&job.frame, self.settings.confidence_threshold);
        timing.detect_us = micros_since(started);

        let t = Instant::now();
        let result = match detections {
            Ok(detections) => {
                tracing::debug!("{} detection(s) from {}", detections.len(), self.detector.name());
                classify(&detections, &job.frame, aim, self.settings.confidence_threshold)
            }
            Err(e) => {
                tracing::warn!("Detector failed: {e}");
                HitResult::Unresolved {
                    aim,
                    reason: e.to_string(),
                }
            }
        };
        timing.classify_us = micros_since(t);

        let t = Instant::now();
        let report = self.registry.dispatch(&result, job);
        timing.score_us = micros_since(t);

        if let (Some(dir), HitResult::Hit(hit)) = (&self.settings.debug_dir, &result) {
            save_debug_images(dir, job, hit, report.warped.as_ref());
        }

        let t = Instant::now();
        let jpeg = encode_jpeg(&report.annotated, RESULT_JPEG_QUALITY)?;
        let payload = ResultPayload::new(job.captured_at, report.target.clone(), report.score(), &jpeg);
        timing.encode_us = micros_since(t);
        timing.total_us = micros_since(started);

        Ok(ProcessedShot {
            payload,
            kind: report.kind,
            timing,
        })
    }

    /// Process one job and forward its result; never panics.
    pub fn handle_job(&mut self, job: &ProcessingJob) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(job)));
        let shot = match outcome {
            Ok(Ok(shot)) => shot,
            Ok(Err(e)) => {
                tracing::error!("Discarding shot from {}: {}", job.captured_at, e);
                return;
            }
            Err(_) => {
                tracing::error!("Shot processing panicked, job from {} discarded", job.captured_at);
                return;
            }
        };

        tracing::info!(
            "✓ Shot processed in {:.1} ms: {} / {:?}",
            shot.timing.total_ms(),
            shot.payload.target,
            shot.payload.score
        );
        self.stats.add(shot.timing);
        self.event_bus.publish(shot_event(&shot));
        self.results.offer(shot.payload);
    }

    pub fn start(mut self, jobs: Receiver<ProcessingJob>) -> std::io::Result<JoinHandle<()>> {
        spawn_named("processing-worker", move || {
            tracing::info!("Processing worker started ({})", self.detector.name());
            while self.state.is_running() {
                match jobs.recv_timeout(self.settings.poll_interval) {
                    Ok(job) => self.handle_job(&job),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            self.stats.print_report();
            tracing::info!("Processing worker stopped");
        })
    }
}

fn shot_event(shot: &ProcessedShot) -> Event {
    match shot.kind {
        ShotKind::Scored { points, registered } => Event::ShotScored {
            target: shot.payload.target.clone(),
            score: points,
            registered,
        },
        ShotKind::Missed => Event::ShotMissed,
        ShotKind::Unresolved => Event::ShotUnresolved,
    }
}

/// Copy of the frame with the hit box outlined and the aim marked.
fn outline_hit(job: &ProcessingJob, hit: &Hit) -> image::RgbImage {
    let mut image = job.frame.image.clone();
    let (w, h) = hit.crop.dimensions();
    let origin = hit.crop_origin;
    draw_rectangle(
        &mut image,
        origin.x,
        origin.y,
        origin.x + w as i32 - 1,
        origin.y + h as i32 - 1,
        YELLOW,
    );
    draw_marker(&mut image, job.aim_point(), Marker::Aim);
    image
}

fn save_debug_images(root: &Path, job: &ProcessingJob, hit: &Hit, warped: Option<&image::RgbImage>) {
    let dir = root.join(job.captured_at.format("%Y%m%d_%H%M%S_%6f").to_string());
    let result = std::fs::create_dir_all(&dir)
        .map_err(image::ImageError::IoError)
        .and_then(|_| outline_hit(job, hit).save(dir.join("1_frame.jpg")))
        .and_then(|_| hit.crop.save(dir.join("2_crop.jpg")))
        .and_then(|_| match warped {
            Some(warped) => warped.save(dir.join("3_warped.jpg")),
            None => Ok(()),
        });

    match result {
        Ok(()) => tracing::debug!("Saved debug images to {}", dir.display()),
        Err(e) => tracing::warn!("Failed to save debug images: {e}"),
    }
}
