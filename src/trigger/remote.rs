/// Wireless shutter remote
///
/// The remote pairs as a keyboard-like input device. Its lifecycle is an
/// explicit state machine:
///
/// ```text
///   Searching ──device found──▶ Grabbed ──read error──▶ Disconnected
///       ▲                                                   │
///       └───────────────────────retry───────────────────────┘
///   (any) ──stop──▶ Stopped
/// ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::TriggerKind;
use crate::capture::{CaptureDispatcher, FramePick};
use crate::error::TriggerError;
use crate::messaging::{Event, EventBus};
use crate::state::SharedState;
use crate::utils::{sleep_while_running, spawn_named, Backoff};

/// State of the remote trigger device
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum TriggerState {
    /// Looking for the device, with backoff between attempts
    #[default]
    Searching,

    /// Device held exclusively, key events are being read
    Grabbed,

    /// Device lost after a read error; waiting before searching again
    Disconnected,

    /// Worker has shut down
    Stopped,
}

impl TriggerState {
    pub fn description(&self) -> &'static str {
        match self {
            TriggerState::Searching => "Searching",
            TriggerState::Grabbed => "Connected",
            TriggerState::Disconnected => "Disconnected",
            TriggerState::Stopped => "Stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// Only a searching machine can grab a device
    NotSearching,

    /// Only a grabbed device can fail
    NotGrabbed,

    /// Retry is only valid after a disconnect
    NotDisconnected,

    /// Nothing leaves the stopped state
    Stopped,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::NotSearching => write!(f, "Trigger device is not being searched for"),
            TransitionError::NotGrabbed => write!(f, "Trigger device is not grabbed"),
            TransitionError::NotDisconnected => write!(f, "Trigger device is not disconnected"),
            TransitionError::Stopped => write!(f, "Trigger worker is stopped"),
        }
    }
}

impl std::error::Error for TransitionError {}

/// State machine for trigger device transitions
#[derive(Debug, Default)]
pub struct TriggerStateMachine {
    state: TriggerState,
}

impl TriggerStateMachine {
    /// Create a new state machine in the Searching state
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Searching → Grabbed
    pub fn device_found(&mut self) -> Result<TriggerState, TransitionError> {
        self.transition(TriggerState::Searching, TriggerState::Grabbed, TransitionError::NotSearching)
    }

    /// Grabbed → Disconnected
    pub fn read_error(&mut self) -> Result<TriggerState, TransitionError> {
        self.transition(TriggerState::Grabbed, TriggerState::Disconnected, TransitionError::NotGrabbed)
    }

    /// Disconnected → Searching
    pub fn retry(&mut self) -> Result<TriggerState, TransitionError> {
        self.transition(
            TriggerState::Disconnected,
            TriggerState::Searching,
            TransitionError::NotDisconnected,
        )
    }

    /// Any → Stopped
    pub fn stop(&mut self) -> Result<TriggerState, TransitionError> {
        if self.state == TriggerState::Stopped {
            return Err(TransitionError::Stopped);
        }
        self.state = TriggerState::Stopped;
        Ok(self.state)
    }

    fn transition(
        &mut self,
        from: TriggerState,
        to: TriggerState,
        err: TransitionError,
    ) -> Result<TriggerState, TransitionError> {
        match self.state {
            TriggerState::Stopped => Err(TransitionError::Stopped),
            state if state == from => {
                self.state = to;
                Ok(to)
            }
            _ => Err(err),
        }
    }
}

/// Keys a shutter remote can send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKey {
    #[default]
    VolumeDown,
    VolumeUp,
    Enter,
    Space,
    PageDown,
    PageUp,
}

impl TriggerKey {
    /// X11 keycodes for the media keys, which rdev leaves unnamed.
    const X11_VOLUME_DOWN: u32 = 122;
    const X11_VOLUME_UP: u32 = 123;

    pub fn from_rdev(key: rdev::Key) -> Option<Self> {
        match key {
            rdev::Key::Unknown(Self::X11_VOLUME_DOWN) => Some(TriggerKey::VolumeDown),
            rdev::Key::Unknown(Self::X11_VOLUME_UP) => Some(TriggerKey::VolumeUp),
            rdev::Key::Return | rdev::Key::KpReturn => Some(TriggerKey::Enter),
            rdev::Key::Space => Some(TriggerKey::Space),
            rdev::Key::PageDown => Some(TriggerKey::PageDown),
            rdev::Key::PageUp => Some(TriggerKey::PageUp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: TriggerKey,
    pub pressed: bool,
}

/// An opened, exclusively held key device.
pub trait KeyDevice: Send {
    fn name(&self) -> &str;

    /// Wait up to `timeout` for the next event; `Ok(None)` on timeout.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<KeyEvent>, TriggerError>;
}

/// Locates the remote among the attached input devices.
pub trait KeyDeviceProvider: Send {
    fn find(&mut self, keyword: &str) -> Result<Option<Box<dyn KeyDevice>>, TriggerError>;
}

/// Timing of the remote trigger worker
#[derive(Debug, Clone, Copy)]
pub struct RemoteTiming {
    pub first_retry: Duration,
    pub search_interval: Duration,
    pub reconnect_wait: Duration,
    pub read_timeout: Duration,
}

impl Default for RemoteTiming {
    fn default() -> Self {
        Self {
            first_retry: Duration::from_secs(1),
            search_interval: Duration::from_secs(5),
            reconnect_wait: Duration::from_secs(2),
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// Worker turning remote key presses into capture requests.
pub struct RemoteTrigger<P: KeyDeviceProvider> {
    provider: P,
    keyword: String,
    key: TriggerKey,
    machine: TriggerStateMachine,
    device: Option<Box<dyn KeyDevice>>,
    dispatcher: CaptureDispatcher,
    state: Arc<SharedState>,
    event_bus: EventBus,
    backoff: Backoff,
    timing: RemoteTiming,
}

impl<P: KeyDeviceProvider + 'static> RemoteTrigger<P> {
    pub fn new(
        provider: P,
        keyword: impl Into<String>,
        key: TriggerKey,
        dispatcher: CaptureDispatcher,
        state: Arc<SharedState>,
        event_bus: EventBus,
        timing: RemoteTiming,
    ) -> Self {
        Self {
            provider,
            keyword: keyword.into(),
            key,
            machine: TriggerStateMachine::new(),
            device: None,
            dispatcher,
            state,
            event_bus,
            backoff: Backoff::new(timing.first_retry, timing.search_interval),
            timing,
        }
    }

    pub fn state(&self) -> TriggerState {
        self.machine.state()
    }

    /// Run one iteration of the state machine.
    pub fn step(&mut self) -> TriggerState {
        match self.machine.state() {
            TriggerState::Searching => self.search(),
            TriggerState::Grabbed => self.read(),
            TriggerState::Disconnected => {
                sleep_while_running(&self.state, self.timing.reconnect_wait);
                self.apply(TriggerStateMachine::retry);
            }
            TriggerState::Stopped => {}
        }
        self.machine.state()
    }

    fn search(&mut self) {
        match self.provider.find(&self.keyword) {
            Ok(Some(device)) => {
                tracing::info!("✓ Trigger remote grabbed: {}", device.name());
                self.device = Some(device);
                self.backoff.reset();
                self.apply(TriggerStateMachine::device_found);
            }
            Ok(None) => {
                let delay = self.backoff.next_delay();
                tracing::debug!(
                    "Trigger remote '{}' not found, retrying in {:?}",
                    self.keyword,
                    delay
                );
                sleep_while_running(&self.state, delay);
            }
            Err(err) => {
                let delay = self.backoff.next_delay();
                tracing::warn!("Trigger device search failed: {err}, retrying in {:?}", delay);
                sleep_while_running(&self.state, delay);
            }
        }
    }

    fn read(&mut self) {
        let Some(device) = self.device.as_mut() else {
            self.apply(TriggerStateMachine::read_error);
            return;
        };

        match device.next_event(self.timing.read_timeout) {
            Ok(Some(event)) if event.pressed && event.key == self.key => {
                self.dispatcher.dispatch(TriggerKind::Remote, FramePick::Oldest);
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!("Trigger remote lost: {err}");
                self.device = None;
                self.apply(TriggerStateMachine::read_error);
            }
        }
    }

    fn apply(
        &mut self,
        transition: fn(&mut TriggerStateMachine) -> Result<TriggerState, TransitionError>,
    ) {
        match transition(&mut self.machine) {
            Ok(state) => self
                .event_bus
                .publish(Event::TriggerDeviceChanged { state }),
            Err(err) => tracing::error!("Invalid trigger transition: {err}"),
        }
    }

    pub fn start(mut self) -> std::io::Result<JoinHandle<()>> {
        spawn_named("remote-trigger", move || {
            tracing::info!("Remote trigger worker started (key {:?})", self.key);
            while self.state.is_running() {
                self.step();
            }
            self.device = None;
            self.apply(TriggerStateMachine::stop);
            tracing::info!("Remote trigger worker stopped");
        })
    }
}

/// Key device backed by a process-wide `rdev` listener.
///
/// rdev cannot enumerate or grab individual devices, so the keyword only
/// labels the device; a remote paired as a keyboard shows up as key events.
/// The listener thread cannot be stopped and is left detached at shutdown.
pub struct RdevKeyboardProvider {
    events: Option<Receiver<KeyEvent>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl RdevKeyboardProvider {
    const BACKLOG: usize = 16;

    pub fn new() -> Self {
        Self {
            events: None,
            failure: Arc::new(Mutex::new(None)),
        }
    }

    fn spawn_listener(&self) -> std::io::Result<Receiver<KeyEvent>> {
        let (tx, rx) = bounded(Self::BACKLOG);
        let failure = Arc::clone(&self.failure);
        thread::Builder::new()
            .name("rdev-listener".to_string())
            .spawn(move || {
                let result = rdev::listen(move |event| forward_key(&tx, event));
                if let Err(err) = result {
                    *failure.lock() = Some(format!("{err:?}"));
                }
            })?;
        Ok(rx)
    }
}

impl Default for RdevKeyboardProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn forward_key(tx: &Sender<KeyEvent>, event: rdev::Event) {
    let (key, pressed) = match event.event_type {
        rdev::EventType::KeyPress(key) => (key, true),
        rdev::EventType::KeyRelease(key) => (key, false),
        _ => return,
    };
    if let Some(key) = TriggerKey::from_rdev(key) {
        if let Err(TrySendError::Full(_)) = tx.try_send(KeyEvent { key, pressed }) {
            tracing::debug!("Key event backlog full, dropping {:?}", key);
        }
    }
}

impl KeyDeviceProvider for RdevKeyboardProvider {
    fn find(&mut self, keyword: &str) -> Result<Option<Box<dyn KeyDevice>>, TriggerError> {
        if let Some(reason) = self.failure.lock().take() {
            self.events = None;
            return Err(TriggerError::GrabFailed(reason));
        }

        let events = match &self.events {
            Some(events) => events.clone(),
            None => {
                let events = self
                    .spawn_listener()
                    .map_err(|e| TriggerError::GrabFailed(e.to_string()))?;
                self.events = Some(events.clone());
                events
            }
        };

        Ok(Some(Box::new(RdevKeyboard {
            name: format!("{keyword} (global keyboard)"),
            events,
            failure: Arc::clone(&self.failure),
        })))
    }
}

struct RdevKeyboard {
    name: String,
    events: Receiver<KeyEvent>,
    failure: Arc<Mutex<Option<String>>>,
}

impl KeyDevice for RdevKeyboard {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<KeyEvent>, TriggerError> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => {
                if self.failure.lock().is_some() {
                    Err(TriggerError::Disconnected)
                } else {
                    Ok(None)
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(TriggerError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameRing;
    use crate::frame::Frame;
    use crate::pipeline::ProcessingJob;
    use image::RgbImage;
    use std::collections::VecDeque;

    struct ScriptedDevice(VecDeque<Result<Option<KeyEvent>, TriggerError>>);

    impl KeyDevice for ScriptedDevice {
        fn name(&self) -> &str {
            "AB Shutter3"
        }

        fn next_event(&mut self, _timeout: Duration) -> Result<Option<KeyEvent>, TriggerError> {
            self.0.pop_front().unwrap_or(Err(TriggerError::Disconnected))
        }
    }

    /// Fails to find the device `misses` times, then hands out the script.
    struct ScriptedProvider {
        misses: usize,
        script: Option<Vec<Result<Option<KeyEvent>, TriggerError>>>,
    }

    impl KeyDeviceProvider for ScriptedProvider {
        fn find(&mut self, _keyword: &str) -> Result<Option<Box<dyn KeyDevice>>, TriggerError> {
            if self.misses > 0 {
                self.misses -= 1;
                return Ok(None);
            }
            Ok(self
                .script
                .take()
                .map(|s| Box::new(ScriptedDevice(s.into())) as Box<dyn KeyDevice>))
        }
    }

    fn press(key: TriggerKey) -> Result<Option<KeyEvent>, TriggerError> {
        Ok(Some(KeyEvent { key, pressed: true }))
    }

    fn fast_timing() -> RemoteTiming {
        RemoteTiming {
            first_retry: Duration::from_millis(1),
            search_interval: Duration::from_millis(2),
            reconnect_wait: Duration::from_millis(1),
            read_timeout: Duration::from_millis(1),
        }
    }

    fn trigger(
        provider: ScriptedProvider,
    ) -> (RemoteTrigger<ScriptedProvider>, crossbeam_channel::Receiver<ProcessingJob>, EventBus) {
        let ring = Arc::new(FrameRing::new(2));
        ring.push(Frame::new(RgbImage::new(4, 4)));
        let state = Arc::new(SharedState::default());
        let bus = EventBus::new();
        let (dispatcher, jobs) = CaptureDispatcher::new(ring, state.clone(), 5, bus.clone());
        let trigger = RemoteTrigger::new(
            provider,
            "AB Shutter3",
            TriggerKey::VolumeDown,
            dispatcher,
            state,
            bus.clone(),
            fast_timing(),
        );
        (trigger, jobs, bus)
    }

    #[test]
    fn test_state_machine_transitions() {
        let mut machine = TriggerStateMachine::new();
        assert_eq!(machine.state(), TriggerState::Searching);

        assert_eq!(machine.read_error(), Err(TransitionError::NotGrabbed));
        assert_eq!(machine.device_found(), Ok(TriggerState::Grabbed));
        assert_eq!(machine.device_found(), Err(TransitionError::NotSearching));
        assert_eq!(machine.read_error(), Ok(TriggerState::Disconnected));
        assert_eq!(machine.retry(), Ok(TriggerState::Searching));

        assert_eq!(machine.stop(), Ok(TriggerState::Stopped));
        assert_eq!(machine.retry(), Err(TransitionError::Stopped));
        assert_eq!(machine.stop(), Err(TransitionError::Stopped));
    }

    #[test]
    fn test_search_grab_fire_disconnect_cycle() {
        let provider = ScriptedProvider {
            misses: 2,
            script: Some(vec![
                Ok(None),
                press(TriggerKey::Enter),
                Ok(Some(KeyEvent {
                    key: TriggerKey::VolumeDown,
                    pressed: false,
                })),
                press(TriggerKey::VolumeDown),
                Err(TriggerError::Disconnected),
            ]),
        };
        let (mut trigger, jobs, bus) = trigger(provider);
        let (events, _id) = bus.subscribe();

        assert_eq!(trigger.step(), TriggerState::Searching);
        assert_eq!(trigger.step(), TriggerState::Searching);
        assert_eq!(trigger.step(), TriggerState::Grabbed);

        for _ in 0..4 {
            assert_eq!(trigger.step(), TriggerState::Grabbed);
        }
        assert_eq!(trigger.step(), TriggerState::Disconnected);
        assert_eq!(trigger.step(), TriggerState::Searching);

        assert_eq!(jobs.try_iter().count(), 1);
        let states: Vec<TriggerState> = events
            .try_iter()
            .filter_map(|e| match e {
                Event::TriggerDeviceChanged { state } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                TriggerState::Grabbed,
                TriggerState::Disconnected,
                TriggerState::Searching,
            ]
        );
    }

    #[test]
    fn test_remote_shots_use_oldest_frame() {
        let provider = ScriptedProvider {
            misses: 0,
            script: Some(vec![press(TriggerKey::VolumeDown)]),
        };
        let (mut trigger, jobs, _bus) = trigger(provider);
        trigger.dispatcher.ring().push(Frame::new(RgbImage::new(8, 8)));

        trigger.step();
        trigger.step();

        let job = jobs.try_recv().unwrap();
        assert_eq!(job.frame.width(), 4);
    }

    #[test]
    fn test_worker_stops_with_running_flag() {
        let provider = ScriptedProvider {
            misses: usize::MAX,
            script: None,
        };
        let (trigger, _jobs, bus) = trigger(provider);
        let (events, _id) = bus.subscribe();
        let state = trigger.state.clone();

        let handle = trigger.start().unwrap();
        state.stop();
        handle.join().unwrap();

        assert!(events.try_iter().any(|e| e
            == Event::TriggerDeviceChanged {
                state: TriggerState::Stopped
            }));
    }

    #[test]
    fn test_rdev_key_mapping() {
        assert_eq!(
            TriggerKey::from_rdev(rdev::Key::Unknown(122)),
            Some(TriggerKey::VolumeDown)
        );
        assert_eq!(TriggerKey::from_rdev(rdev::Key::Return), Some(TriggerKey::Enter));
        assert_eq!(TriggerKey::from_rdev(rdev::Key::KeyA), None);

        let key: TriggerKey = serde_json::from_str(r#""volume_down""#).unwrap();
        assert_eq!(key, TriggerKey::VolumeDown);
    }
}
