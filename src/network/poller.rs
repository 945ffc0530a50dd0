/// Command poller
///
/// Polls `/get_command` on a fixed interval and forwards commands to the
/// executor. Also acts as the heartbeat that brings the connectivity flag
/// back to `true` after an outage.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError};

use super::{record_outcome, RemoteServer};
use crate::messaging::{Command, EventBus};
use crate::state::SharedState;
use crate::utils::{sleep_while_running, spawn_named};

/// Result of a single poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Idle,
    Command(Command),
    Failed,
}

pub struct CommandPoller {
    server: Arc<dyn RemoteServer>,
    state: Arc<SharedState>,
    event_bus: EventBus,
    commands: Sender<Command>,
    heartbeat_grace: Duration,
    last_heartbeat: Option<Instant>,
}

impl CommandPoller {
    pub fn new(
        server: Arc<dyn RemoteServer>,
        state: Arc<SharedState>,
        event_bus: EventBus,
        commands: Sender<Command>,
        heartbeat_grace: Duration,
    ) -> Self {
        Self {
            server,
            state,
            event_bus,
            commands,
            heartbeat_grace,
            last_heartbeat: None,
        }
    }

    /// Poll once, update connectivity, and forward any command.
    pub fn poll_once(&mut self) -> PollOutcome {
        self.poll_at(Instant::now())
    }

    fn poll_at(&mut self, now: Instant) -> PollOutcome {
        let envelope = match self.server.fetch_command() {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!("Command poll failed: {err}");
                self.missed_heartbeat(now);
                return PollOutcome::Failed;
            }
        };

        // Only a timestamped answer counts as a heartbeat; a bare 200 leaves
        // connectivity as it was.
        if envelope.timestamp.is_some() {
            self.last_heartbeat = Some(now);
            record_outcome(&self.state, &self.event_bus, true, "command poller");
        } else {
            tracing::debug!("Command poll returned no heartbeat timestamp");
        }

        let Some(command) = envelope.command else {
            return PollOutcome::Idle;
        };

        tracing::info!("Received command: {}", command.description());
        match self.commands.try_send(command.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Command queue full, dropping: {}", command.description())
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("Command executor gone, dropping: {}", command.description())
            }
        }
        PollOutcome::Command(command)
    }

    fn missed_heartbeat(&self, now: Instant) {
        let expired = self
            .last_heartbeat
            .map_or(true, |last| now.duration_since(last) >= self.heartbeat_grace);
        if expired {
            record_outcome(&self.state, &self.event_bus, false, "command poller");
        }
    }

    pub fn start(mut self, interval: Duration) -> std::io::Result<JoinHandle<()>> {
        spawn_named("command-poller", move || {
            tracing::info!("Command poller started ({:?} interval)", interval);
            while self.state.is_running() {
                self.poll_once();
                sleep_while_running(&self.state, interval);
            }
            tracing::info!("Command poller stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::messaging::CommandEnvelope;
    use crate::network::MemoryServer;
    use crossbeam_channel::bounded;

    fn poller(
        server: &Arc<MemoryServer>,
        state: &Arc<SharedState>,
        capacity: usize,
    ) -> (CommandPoller, crossbeam_channel::Receiver<Command>) {
        let (tx, rx) = bounded(capacity);
        let poller = CommandPoller::new(
            server.clone(),
            state.clone(),
            EventBus::new(),
            tx,
            Duration::from_secs(5),
        );
        (poller, rx)
    }

    #[test]
    fn test_forwards_commands() {
        let server = Arc::new(MemoryServer::default());
        let state = Arc::new(SharedState::default());
        let (mut poller, rx) = poller(&server, &state, 4);

        server.push_command(Command::Zoom(2.5));
        assert_eq!(poller.poll_once(), PollOutcome::Command(Command::Zoom(2.5)));
        assert_eq!(poller.poll_once(), PollOutcome::Idle);
        assert_eq!(rx.try_recv().unwrap(), Command::Zoom(2.5));
    }

    #[test]
    fn test_successful_poll_reconnects() {
        let server = Arc::new(MemoryServer::default());
        let state = Arc::new(SharedState::default());
        let (mut poller, _rx) = poller(&server, &state, 4);

        state.connectivity().set(false, "result dispatcher");
        poller.poll_once();
        assert!(state.connectivity().is_connected());
    }

    #[test]
    fn test_failure_within_grace_keeps_connected() {
        let server = Arc::new(MemoryServer::default());
        let state = Arc::new(SharedState::default());
        let (mut poller, _rx) = poller(&server, &state, 4);
        let start = Instant::now();

        assert_eq!(poller.poll_at(start), PollOutcome::Idle);
        server.set_online(false);

        assert_eq!(poller.poll_at(start + Duration::from_secs(2)), PollOutcome::Failed);
        assert!(state.connectivity().is_connected());

        poller.poll_at(start + Duration::from_secs(6));
        assert!(!state.connectivity().is_connected());
    }

    #[test]
    fn test_failure_without_any_heartbeat_disconnects() {
        let server = Arc::new(MemoryServer::default());
        let state = Arc::new(SharedState::default());
        let (mut poller, _rx) = poller(&server, &state, 4);

        server.set_online(false);
        poller.poll_once();
        assert!(!state.connectivity().is_connected());
    }

    /// Answers every poll with the same envelope
    struct FixedEnvelope(CommandEnvelope);

    impl RemoteServer for FixedEnvelope {
        fn upload_result(&self, _payload: &crate::network::ResultPayload) -> Result<(), NetworkError> {
            Ok(())
        }

        fn upload_frame(&self, _jpeg: &[u8]) -> Result<(), NetworkError> {
            Ok(())
        }

        fn fetch_command(&self) -> Result<CommandEnvelope, NetworkError> {
            Ok(self.0.clone())
        }

        fn report_config(&self, _settings: &crate::state::DeviceSettings) -> Result<(), NetworkError> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_timestamp_still_forwards_command() {
        let server = Arc::new(FixedEnvelope(CommandEnvelope {
            timestamp: None,
            command: Some(Command::Zoom(2.0)),
        }));
        let state = Arc::new(SharedState::default());
        let (tx, rx) = bounded(4);
        let mut poller = CommandPoller::new(server, state.clone(), EventBus::new(), tx, Duration::from_secs(5));

        assert_eq!(poller.poll_once(), PollOutcome::Command(Command::Zoom(2.0)));
        assert!(state.connectivity().is_connected());
        assert_eq!(rx.try_recv().unwrap(), Command::Zoom(2.0));

        // Nor does it bring a disconnected flag back
        state.connectivity().set(false, "result dispatcher");
        poller.poll_once();
        assert!(!state.connectivity().is_connected());
        assert!(poller.last_heartbeat.is_none());
    }

    #[test]
    fn test_full_command_queue_does_not_block() {
        let server = Arc::new(MemoryServer::default());
        let state = Arc::new(SharedState::default());
        let (mut poller, rx) = poller(&server, &state, 1);

        server.push_command(Command::Zoom(2.0));
        server.push_command(Command::Zoom(3.0));
        poller.poll_once();
        poller.poll_once();

        assert_eq!(rx.try_iter().count(), 1);
    }
}
