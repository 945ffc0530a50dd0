// Integration tests for the target scorer
// These tests drive the full shot pipeline against an in-memory server

use std::sync::Arc;
use std::time::Duration;

use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use target_scorer::capture::{CaptureDispatcher, DispatchOutcome, FramePick, FrameRing};
use target_scorer::detection::{Detection, Detector};
use target_scorer::error::DetectionError;
use target_scorer::frame::{AimPoint, Frame};
use target_scorer::messaging::{Command, CommandExecutor, DropReason, Event, EventBus};
use target_scorer::network::{
    CommandPoller, MemoryServer, PollOutcome, RemoteServer, ResultDispatcher, ResultQueue,
    ScoreValue,
};
use target_scorer::pipeline::{ProcessingWorker, WorkerSettings};
use target_scorer::registration::RegistrationParams;
use target_scorer::scoring::RingTable;
use target_scorer::state::{CalibrationStore, DeviceSettings, SharedState};
use target_scorer::targets::{RingTarget, TargetProfile, TargetRegistry};
use target_scorer::trigger::TriggerKind;

const CANONICAL: (u32, u32) = (320, 320);
const OFFSET: (u32, u32) = (60, 40);

/// Seeded collage of grey rectangles with plenty of corners
fn textured(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = RgbImage::from_pixel(width, height, Rgb([90, 90, 90]));
    for _ in 0..120 {
        let w = rng.gen_range(8..40);
        let h = rng.gen_range(8..40);
        let x0 = rng.gen_range(0..width - w);
        let y0 = rng.gen_range(0..height - h);
        let v: u8 = rng.gen_range(0..=255);
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                img.put_pixel(x, y, Rgb([v, v, v]));
            }
        }
    }
    img
}

/// Reports one box around the pasted target
struct FixedDetector(Vec<Detection>);

impl Detector for FixedDetector {
    fn detect(&self, _frame: &Frame, threshold: f32) -> Result<Vec<Detection>, DetectionError> {
        Ok(self.0.iter().filter(|d| d.confidence >= threshold).cloned().collect())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

struct Rig {
    state: Arc<SharedState>,
    bus: EventBus,
    server: Arc<MemoryServer>,
    dispatcher: CaptureDispatcher,
    jobs: crossbeam_channel::Receiver<target_scorer::pipeline::ProcessingJob>,
}

fn rig(queue_capacity: usize) -> Rig {
    let state = Arc::new(SharedState::new(DeviceSettings::default()));
    let bus = EventBus::new();
    let (dispatcher, jobs) = CaptureDispatcher::new(
        Arc::new(FrameRing::new(2)),
        Arc::clone(&state),
        queue_capacity,
        bus.clone(),
    );
    Rig {
        state,
        bus,
        server: Arc::new(MemoryServer::default()),
        dispatcher,
        jobs,
    }
}

fn registry(canonical: RgbImage) -> TargetRegistry {
    let params = RegistrationParams::default();
    let profile = TargetProfile::from_parts(
        "bia_so_4".into(),
        1,
        "Target 4".into(),
        canonical,
        GrayImage::from_pixel(CANONICAL.0, CANONICAL.1, Luma([255])),
        RingTable::standard(),
        false,
        &params,
    )
    .unwrap();
    TargetRegistry::new(vec![Box::new(RingTarget::new(profile, params))], "bia_so_4").unwrap()
}

#[test]
fn test_shot_on_target_is_scored_and_uploaded() {
    let rig = rig(5);
    let canonical = textured(CANONICAL.0, CANONICAL.1, 11);
    let mut scene = RgbImage::from_pixel(480, 400, Rgb([30, 30, 30]));
    imageops::replace(&mut scene, &canonical, OFFSET.0 as i64, OFFSET.1 as i64);

    // Aim at the middle of the target face
    let aim = AimPoint::new((OFFSET.0 + 160) as i32, (OFFSET.1 + 160) as i32);
    rig.state.update_settings(|s| s.center = Some(aim));
    rig.dispatcher.ring().push(Frame::new(scene));

    assert_eq!(
        rig.dispatcher.dispatch(TriggerKind::Remote, FramePick::Oldest),
        DispatchOutcome::Queued
    );
    let job = rig.jobs.try_recv().unwrap();
    assert_eq!(job.aim_point(), aim);

    let (results, results_rx) = ResultQueue::bounded(4);
    let detection = Detection::new(
        [
            OFFSET.0 as f32,
            OFFSET.1 as f32,
            (OFFSET.0 + CANONICAL.0) as f32,
            (OFFSET.1 + CANONICAL.1) as f32,
        ],
        0.92,
    )
    .named("bia_so_4");
    let (events, _) = rig.bus.subscribe();
    let mut worker = ProcessingWorker::new(
        Arc::new(FixedDetector(vec![detection])),
        Arc::new(registry(canonical)),
        results,
        Arc::clone(&rig.state),
        rig.bus.clone(),
        WorkerSettings {
            confidence_threshold: 0.5,
            poll_interval: Duration::from_millis(10),
            debug_dir: None,
        },
    );
    worker.handle_job(&job);

    let payload = results_rx.try_recv().unwrap();
    assert_eq!(payload.target, "Target 4");
    assert_eq!(payload.score, ScoreValue::Points(10));
    assert!(!payload.image_data.is_empty());
    assert!(matches!(
        events.try_recv().unwrap(),
        Event::ShotScored { score: 10, .. }
    ));

    let sender = ResultDispatcher::new(
        Arc::clone(&rig.server) as Arc<dyn RemoteServer>,
        Arc::clone(&rig.state),
        rig.bus.clone(),
    );
    assert!(sender.send(&payload));

    let uploaded = rig.server.results();
    assert_eq!(uploaded.len(), 1);
    let json = serde_json::to_value(&uploaded[0]).unwrap();
    assert_eq!(json["score"], 10);
    assert_eq!(json["target"], "Target 4");
}

#[test]
fn test_burst_beyond_queue_capacity_is_dropped() {
    let rig = rig(2);
    let (events, _) = rig.bus.subscribe();
    rig.dispatcher.ring().push(Frame::new(RgbImage::new(8, 8)));

    let outcomes: Vec<DispatchOutcome> = (0..4)
        .map(|_| rig.dispatcher.dispatch(TriggerKind::Edge, FramePick::Latest))
        .collect();

    assert_eq!(
        outcomes,
        vec![
            DispatchOutcome::Queued,
            DispatchOutcome::Queued,
            DispatchOutcome::Dropped(DropReason::QueueFull),
            DispatchOutcome::Dropped(DropReason::QueueFull),
        ]
    );
    assert_eq!(rig.jobs.len(), 2);
    let dropped = events
        .try_iter()
        .filter(|e| matches!(e, Event::JobDropped { .. }))
        .count();
    assert_eq!(dropped, 2);
}

#[test]
fn test_connectivity_flips_once_each_way() {
    let rig = rig(1);
    let (events, _) = rig.bus.subscribe();
    let server: Arc<dyn RemoteServer> = Arc::clone(&rig.server) as Arc<dyn RemoteServer>;
    let sender = ResultDispatcher::new(Arc::clone(&server), Arc::clone(&rig.state), rig.bus.clone());
    let (commands, _command_rx) = crossbeam_channel::bounded(4);
    let mut poller = CommandPoller::new(
        Arc::clone(&server),
        Arc::clone(&rig.state),
        rig.bus.clone(),
        commands,
        Duration::from_secs(5),
    );
    let payload = target_scorer::network::ResultPayload::new(
        chrono::Local::now(),
        "Target 4",
        ScoreValue::Points(7),
        b"jpeg",
    );

    rig.server.set_online(false);
    assert!(!sender.send(&payload));
    assert!(!sender.send(&payload));
    assert!(!rig.state.connectivity().is_connected());

    rig.server.set_online(true);
    assert_eq!(poller.poll_once(), PollOutcome::Idle);
    assert_eq!(poller.poll_once(), PollOutcome::Idle);
    assert!(rig.state.connectivity().is_connected());

    let changes: Vec<Event> = events
        .try_iter()
        .filter(|e| matches!(e, Event::ConnectivityChanged { .. }))
        .collect();
    assert_eq!(
        changes,
        vec![
            Event::ConnectivityChanged { connected: false },
            Event::ConnectivityChanged { connected: true },
        ]
    );
}

#[test]
fn test_remote_commands_update_and_persist_calibration() {
    let tmp = tempfile::TempDir::new().unwrap();
    let rig = rig(1);
    let server: Arc<dyn RemoteServer> = Arc::clone(&rig.server) as Arc<dyn RemoteServer>;
    let store = CalibrationStore::new(tmp.path().join("device_config.json"));
    let (commands, command_rx) = crossbeam_channel::bounded(4);
    let mut poller = CommandPoller::new(
        Arc::clone(&server),
        Arc::clone(&rig.state),
        rig.bus.clone(),
        commands,
        Duration::from_secs(5),
    );
    let executor = CommandExecutor::new(
        Arc::clone(&rig.state),
        store.clone(),
        Arc::clone(&server),
        rig.bus.clone(),
    );

    rig.server.push_command(Command::Center(Some(AimPoint::new(200, 310))));
    rig.server.push_command(Command::Zoom(2.5));
    for _ in 0..2 {
        assert!(matches!(poller.poll_once(), PollOutcome::Command(_)));
        executor.execute_sync(command_rx.try_recv().unwrap());
    }

    let settings = rig.state.settings();
    assert_eq!(settings.center, Some(AimPoint::new(200, 310)));
    assert_eq!(settings.zoom, 2.5);
    assert_eq!(store.load().unwrap(), settings);
    assert_eq!(rig.server.reported_configs().last(), Some(&settings));
}
