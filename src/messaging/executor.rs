/// Command executor
///
/// The only writer of the aim calibration. Applies remote commands to the
/// shared state, persists the result and reports it back to the server.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::bus::EventBus;
use super::commands::Command;
use super::events::Event;
use crate::network::{record_outcome, RemoteServer};
use crate::state::{CalibrationStore, DeviceSettings, SharedState};
use crate::utils::spawn_named;

/// Command executor that applies commands and emits events
#[derive(Clone)]
pub struct CommandExecutor {
    state: Arc<SharedState>,
    store: CalibrationStore,
    server: Arc<dyn RemoteServer>,
    event_bus: EventBus,
}

impl CommandExecutor {
    pub fn new(
        state: Arc<SharedState>,
        store: CalibrationStore,
        server: Arc<dyn RemoteServer>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            state,
            store,
            server,
            event_bus,
        }
    }

    /// Execute a command immediately (blocking on disk and network I/O)
    pub fn execute_sync(&self, command: Command) -> DeviceSettings {
        tracing::info!("Executing command: {}", command.description());

        let settings = self.state.update_settings(|settings| match command {
            Command::Center(center) => settings.center = center,
            Command::Zoom(zoom) => settings.zoom = zoom,
        });

        if let Err(err) = self.store.save(&settings) {
            tracing::warn!("Failed to persist calibration: {err}");
        }

        self.event_bus.publish(Event::CalibrationChanged {
            zoom: settings.zoom,
            center: settings.center,
        });
        self.report(&settings);
        settings
    }

    /// Send the current settings to the server
    pub fn report_current(&self) {
        let settings = self.state.settings();
        self.report(&settings);
    }

    fn report(&self, settings: &DeviceSettings) {
        let result = self.server.report_config(settings);
        if let Err(err) = &result {
            tracing::warn!("Failed to report config: {err}");
        }
        record_outcome(&self.state, &self.event_bus, result.is_ok(), "config report");
    }

    /// Start the command processing loop in a background thread
    pub fn start_processing(
        self,
        commands: Receiver<Command>,
        poll_interval: Duration,
    ) -> std::io::Result<thread::JoinHandle<()>> {
        spawn_named("command-executor", move || {
            tracing::info!("Command executor thread started");
            self.report_current();

            while self.state.is_running() {
                match commands.recv_timeout(poll_interval) {
                    Ok(command) => {
                        self.execute_sync(command);
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            tracing::info!("Command executor thread stopped");
        })
    }
}
