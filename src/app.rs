/// Application wiring
///
/// ```text
///               ┌──────────── edge trigger (polled in the capture loop)
/// frame source ─┤
///               └─▶ ring buffer ◀── remote trigger thread
///                       │ dispatch
///                       ▼
///            processing queue ─▶ processing worker ─▶ result queue ─▶ result dispatcher
/// preview queue ─▶ stream sender
/// command poller ─▶ command queue ─▶ command executor
/// event bus ─▶ audio worker
/// ```
///
/// The capture loop runs on the calling thread; everything else runs on
/// named worker threads that are joined at shutdown.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::bounded;

use crate::audio::{start_audio_worker, SoundLibrary};
use crate::capture::{CaptureDispatcher, FramePick, FrameRing, FrameSource, ReplaySource};
use crate::config::Config;
use crate::detection::{Detector, HttpDetector};
use crate::error::AppResult;
use crate::frame::Frame;
use crate::messaging::{CommandExecutor, Event, EventBus};
use crate::network::{
    CommandPoller, HttpServer, MemoryServer, PreviewQueue, RemoteServer, ResultDispatcher,
    ResultQueue, StreamSender,
};
use crate::pipeline::annotate::{draw_marker, encode_jpeg, Marker};
use crate::pipeline::{ProcessingWorker, WorkerSettings};
use crate::state::{CalibrationStore, DeviceSettings, SharedState};
use crate::targets::TargetRegistry;
use crate::trigger::{EdgeTrigger, RdevKeyboardProvider, RemoteTiming, RemoteTrigger, SysfsGpioInput, TriggerKind};

/// Attempts to get a first frame for detector warm-up
const WARM_UP_ATTEMPTS: usize = 50;

/// One pass of the real-time loop: grab, buffer, preview, poll the edge
/// trigger. Never blocks on anything but the frame source.
pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    dispatcher: CaptureDispatcher,
    preview: PreviewQueue,
    edge: Option<EdgeTrigger>,
    state: Arc<SharedState>,
    preview_quality: u8,
    applied_zoom: f32,
    frames: u64,
}

impl CaptureLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        dispatcher: CaptureDispatcher,
        preview: PreviewQueue,
        edge: Option<EdgeTrigger>,
        state: Arc<SharedState>,
        preview_quality: u8,
    ) -> Self {
        Self {
            source,
            dispatcher,
            preview,
            edge,
            state,
            preview_quality,
            applied_zoom: f32::NAN,
            frames: 0,
        }
    }

    /// Returns `false` when the source had no frame this pass.
    pub fn tick(&mut self) -> bool {
        let settings = self.state.settings();
        if settings.zoom != self.applied_zoom {
            self.source.set_zoom(settings.zoom);
            self.applied_zoom = settings.zoom;
        }

        let Some(frame) = self.source.capture() else {
            return false;
        };
        self.frames += 1;

        if self.preview.has_room() {
            self.offer_preview(&frame, settings);
        }
        self.dispatcher.ring().push(frame);

        if let Some(edge) = self.edge.as_mut() {
            if edge.poll() {
                self.dispatcher.dispatch(TriggerKind::Edge, FramePick::Latest);
            }
        }
        true
    }

    fn offer_preview(&self, frame: &Frame, settings: DeviceSettings) {
        let mut preview = frame.image.clone();
        let aim = settings.center.unwrap_or_else(|| frame.center());
        draw_marker(&mut preview, aim, Marker::Aim);
        match encode_jpeg(&preview, self.preview_quality) {
            Ok(jpeg) => {
                self.preview.offer(jpeg);
            }
            Err(e) => tracing::warn!("Preview frame not encoded: {e}"),
        }
    }

    pub fn run(&mut self, interval: Duration) {
        tracing::info!("✓ Capture loop running");
        while self.state.is_running() {
            if !self.tick() {
                thread::sleep(interval.max(Duration::from_millis(10)));
                continue;
            }
            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }
        tracing::info!("Capture loop stopped after {} frames", self.frames);
    }

    /// First frame from the source, retrying while it warms up.
    pub fn first_frame(&mut self) -> Option<Frame> {
        (0..WARM_UP_ATTEMPTS).find_map(|_| {
            let frame = self.source.capture();
            if frame.is_none() {
                thread::sleep(Duration::from_millis(100));
            }
            frame
        })
    }

    pub fn stop(&mut self) {
        self.source.stop();
    }
}

/// Start every component, run the capture loop until Ctrl-C, then shut down.
pub fn run(config: Config) -> AppResult<()> {
    let store = CalibrationStore::new(&config.calibration_path);
    let settings = store.load().unwrap_or_else(|e| {
        tracing::warn!("Calibration unreadable, using defaults: {e}");
        DeviceSettings::default()
    });
    tracing::info!(
        "Calibration: zoom {:.1}x, aim {:?}",
        settings.zoom,
        settings.center
    );

    let state = Arc::new(SharedState::new(settings));
    let event_bus = EventBus::new();
    let server: Arc<dyn RemoteServer> = if config.offline {
        tracing::warn!("Offline mode: results are kept in memory only");
        Arc::new(MemoryServer::default())
    } else {
        Arc::new(HttpServer::new(&config.network))
    };
    let detector: Arc<dyn Detector> = Arc::new(HttpDetector::new(&config.detector));
    let registry = Arc::new(
        TargetRegistry::load(&config.targets, &config.registration)
            .context("Failed to load target profiles")?,
    );

    let mut source = ReplaySource::new(
        &config.capture.frames_dir,
        (config.stream.width, config.stream.height),
    );
    source.start().context("Failed to start frame source")?;

    let ring = Arc::new(FrameRing::new(config.capture.ring_capacity));
    let (dispatcher, jobs) = CaptureDispatcher::new(
        Arc::clone(&ring),
        Arc::clone(&state),
        config.queues.processing,
        event_bus.clone(),
    );
    let (preview, preview_rx) = PreviewQueue::bounded(config.queues.preview);
    let (results, results_rx) = ResultQueue::bounded(config.queues.results);
    let (command_tx, command_rx) = bounded(config.queues.commands.max(1));

    let edge = config.trigger.edge.gpio_path.as_ref().map(|path| {
        tracing::info!("✓ Edge trigger on {}", path.display());
        EdgeTrigger::new(
            Box::new(SysfsGpioInput::new(path.clone())),
            config.trigger.edge.debounce_ms,
        )
    });
    let mut capture = CaptureLoop::new(
        Box::new(source),
        dispatcher.clone(),
        preview,
        edge,
        Arc::clone(&state),
        config.stream.jpeg_quality,
    );

    {
        let state = Arc::clone(&state);
        ctrlc::set_handler(move || {
            tracing::info!("Shutdown requested");
            state.stop();
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let poll = config.timing.worker_poll();
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    if let Some(dir) = &config.sounds_dir {
        workers.push(start_audio_worker(
            SoundLibrary::load(dir),
            event_bus.clone(),
            Arc::clone(&state),
            poll,
        )?);
    }

    match capture.first_frame() {
        Some(frame) => match detector.warm_up(&frame) {
            Ok(()) => tracing::info!("✓ Detector '{}' warmed up", detector.name()),
            Err(e) => tracing::warn!("Detector warm-up failed: {e}"),
        },
        None => tracing::warn!("No frame for detector warm-up"),
    }

    workers.push(
        ProcessingWorker::new(
            Arc::clone(&detector),
            Arc::clone(&registry),
            results,
            Arc::clone(&state),
            event_bus.clone(),
            WorkerSettings {
                confidence_threshold: config.detector.confidence_threshold,
                poll_interval: poll,
                debug_dir: config.debug_dir.clone(),
            },
        )
        .start(jobs)?,
    );
    workers.push(
        ResultDispatcher::new(Arc::clone(&server), Arc::clone(&state), event_bus.clone())
            .start(results_rx, poll)?,
    );
    workers.push(
        StreamSender::new(Arc::clone(&server), Arc::clone(&state), event_bus.clone())
            .start(preview_rx, poll)?,
    );
    workers.push(
        CommandPoller::new(
            Arc::clone(&server),
            Arc::clone(&state),
            event_bus.clone(),
            command_tx,
            Duration::from_millis(config.timing.heartbeat_grace_ms),
        )
        .start(Duration::from_millis(config.timing.command_poll_ms))?,
    );
    workers.push(
        CommandExecutor::new(
            Arc::clone(&state),
            store,
            Arc::clone(&server),
            event_bus.clone(),
        )
        .start_processing(command_rx, poll)?,
    );

    if config.trigger.remote.enabled {
        let timing = RemoteTiming {
            search_interval: Duration::from_millis(config.timing.trigger_search_ms),
            reconnect_wait: Duration::from_millis(config.timing.trigger_reconnect_ms),
            ..RemoteTiming::default()
        };
        workers.push(
            RemoteTrigger::new(
                RdevKeyboardProvider::new(),
                config.trigger.remote.device_keyword.clone(),
                config.trigger.remote.key,
                dispatcher,
                Arc::clone(&state),
                event_bus.clone(),
                timing,
            )
            .start()?,
        );
    }

    tracing::info!("✓ System ready, {} workers running", workers.len());
    event_bus.publish(Event::Started);

    capture.run(Duration::from_millis(config.timing.capture_interval_ms));

    event_bus.publish(Event::Shutdown);
    state.stop();
    for worker in workers {
        let name = worker.thread().name().unwrap_or("worker").to_string();
        if worker.join().is_err() {
            tracing::error!("Worker '{name}' panicked");
        }
    }
    capture.stop();
    tracing::info!("✓ Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::DispatchOutcome;
    use crate::error::{CaptureError, TriggerError};
    use crate::frame::AimPoint;
    use crate::pipeline::ProcessingJob;
    use crate::trigger::{DigitalInput, Level};
    use crossbeam_channel::Receiver;
    use image::RgbImage;
    use parking_lot::Mutex;

    struct CountingSource {
        zooms: Arc<Mutex<Vec<f32>>>,
        available: bool,
    }

    impl FrameSource for CountingSource {
        fn start(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }

        fn capture(&mut self) -> Option<Frame> {
            self.available.then(|| Frame::new(RgbImage::new(64, 48)))
        }

        fn set_zoom(&mut self, zoom: f32) {
            self.zooms.lock().push(zoom);
        }

        fn stop(&mut self) {}
    }

    struct Levels(Vec<Level>);

    impl DigitalInput for Levels {
        fn read(&mut self) -> Result<Level, TriggerError> {
            Ok(if self.0.is_empty() { Level::Low } else { self.0.remove(0) })
        }
    }

    struct Harness {
        capture: CaptureLoop,
        zooms: Arc<Mutex<Vec<f32>>>,
        preview: Receiver<Vec<u8>>,
        jobs: Receiver<ProcessingJob>,
        state: Arc<SharedState>,
    }

    fn harness(available: bool, edge: Option<EdgeTrigger>) -> Harness {
        let state = Arc::new(SharedState::default());
        let zooms = Arc::new(Mutex::new(Vec::new()));
        let (dispatcher, jobs) = CaptureDispatcher::new(
            Arc::new(FrameRing::new(2)),
            Arc::clone(&state),
            5,
            EventBus::new(),
        );
        let (preview_queue, preview) = PreviewQueue::bounded(1);
        let source = CountingSource {
            zooms: Arc::clone(&zooms),
            available,
        };
        let capture = CaptureLoop::new(
            Box::new(source),
            dispatcher,
            preview_queue,
            edge,
            Arc::clone(&state),
            75,
        );
        Harness {
            capture,
            zooms,
            preview,
            jobs,
            state,
        }
    }

    #[test]
    fn test_tick_buffers_and_previews() {
        let mut h = harness(true, None);

        assert!(h.capture.tick());
        assert!(h.capture.tick());
        assert!(h.capture.tick());

        assert_eq!(h.capture.dispatcher.ring().len(), 2);
        // Preview queue holds one frame; the rest were never encoded
        assert_eq!(h.preview.len(), 1);
    }

    #[test]
    fn test_zoom_applied_only_on_change() {
        let mut h = harness(true, None);

        h.capture.tick();
        h.capture.tick();
        h.state.update_settings(|s| s.zoom = 2.0);
        h.capture.tick();

        assert_eq!(*h.zooms.lock(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_missing_frame_is_not_fatal() {
        let mut h = harness(false, None);
        assert!(!h.capture.tick());
        assert!(h.capture.dispatcher.ring().is_empty());
    }

    #[test]
    fn test_edge_trigger_dispatches_latest_frame() {
        let edge = EdgeTrigger::new(Box::new(Levels(vec![Level::Low, Level::High])), 0);
        let mut h = harness(true, Some(edge));
        h.state.update_settings(|s| s.center = Some(AimPoint::new(5, 6)));

        h.capture.tick();
        assert!(h.jobs.is_empty());
        h.capture.tick();

        let job = h.jobs.try_recv().unwrap();
        assert_eq!(job.source, TriggerKind::Edge);
        assert_eq!(job.aim, Some(AimPoint::new(5, 6)));
        assert_eq!(
            h.capture.dispatcher.dispatch(TriggerKind::Edge, FramePick::Latest),
            DispatchOutcome::Queued
        );
    }
}
