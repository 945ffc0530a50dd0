use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::NetworkError;
use crate::messaging::{Command, CommandEnvelope};
use crate::state::DeviceSettings;

use super::client::{COMMAND_ENDPOINT, CONFIG_ENDPOINT, FRAME_ENDPOINT, RESULT_ENDPOINT};
use super::payload::ResultPayload;
use super::RemoteServer;

/// In-process stand-in for the viewer server.
///
/// Records everything it receives and hands out queued commands. Used by
/// offline mode and by tests; `set_online(false)` makes every call fail with
/// a 503 so connectivity handling can be exercised.
#[derive(Debug)]
pub struct MemoryServer {
    online: AtomicBool,
    results: Mutex<Vec<ResultPayload>>,
    configs: Mutex<Vec<DeviceSettings>>,
    commands: Mutex<VecDeque<Command>>,
    frames: AtomicUsize,
    polls: AtomicUsize,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self {
            online: AtomicBool::new(true),
            results: Mutex::new(Vec::new()),
            configs: Mutex::new(Vec::new()),
            commands: Mutex::new(VecDeque::new()),
            frames: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
        }
    }
}

impl MemoryServer {
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    pub fn push_command(&self, command: Command) {
        self.commands.lock().push_back(command);
    }

    pub fn results(&self) -> Vec<ResultPayload> {
        self.results.lock().clone()
    }

    pub fn reported_configs(&self) -> Vec<DeviceSettings> {
        self.configs.lock().clone()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.load(Ordering::Acquire)
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::Acquire)
    }

    fn check(&self, endpoint: &'static str) -> Result<(), NetworkError> {
        if self.online.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(NetworkError::Status {
                endpoint,
                status: 503,
            })
        }
    }
}

impl RemoteServer for MemoryServer {
    fn upload_result(&self, payload: &ResultPayload) -> Result<(), NetworkError> {
        self.check(RESULT_ENDPOINT)?;
        self.results.lock().push(payload.clone());
        Ok(())
    }

    fn upload_frame(&self, _jpeg: &[u8]) -> Result<(), NetworkError> {
        self.check(FRAME_ENDPOINT)?;
        self.frames.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn fetch_command(&self) -> Result<CommandEnvelope, NetworkError> {
        self.polls.fetch_add(1, Ordering::AcqRel);
        self.check(COMMAND_ENDPOINT)?;
        let timestamp = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        Ok(CommandEnvelope {
            timestamp: Some(timestamp),
            command: self.commands.lock().pop_front(),
        })
    }

    fn report_config(&self, settings: &DeviceSettings) -> Result<(), NetworkError> {
        self.check(CONFIG_ENDPOINT)?;
        self.configs.lock().push(*settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_are_served_once_in_order() {
        let server = MemoryServer::default();
        server.push_command(Command::Zoom(2.0));
        server.push_command(Command::Center(None));

        assert_eq!(server.fetch_command().unwrap().command, Some(Command::Zoom(2.0)));
        assert_eq!(server.fetch_command().unwrap().command, Some(Command::Center(None)));
        let idle = server.fetch_command().unwrap();
        assert!(idle.command.is_none());
        assert!(idle.timestamp.is_some());
        assert_eq!(server.poll_count(), 3);
    }

    #[test]
    fn test_offline_server_rejects_everything() {
        let server = MemoryServer::default();
        server.set_online(false);

        assert!(server.upload_frame(b"jpeg").is_err());
        assert!(server.fetch_command().is_err());
        assert!(server.report_config(&DeviceSettings::default()).is_err());
        assert_eq!(server.frame_count(), 0);
    }
}
