/// Result dispatcher
///
/// Drains the result queue and uploads each payload. A failed upload drops
/// the payload and marks the server disconnected; nothing is retried, so a
/// dead server never grows a backlog.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use super::payload::ResultPayload;
use super::{record_outcome, RemoteServer};
use crate::messaging::EventBus;
use crate::state::SharedState;
use crate::utils::spawn_named;

/// Producer side of the outbound result queue (drop-newest when full).
#[derive(Clone)]
pub struct ResultQueue {
    sender: Sender<ResultPayload>,
}

impl ResultQueue {
    pub fn bounded(capacity: usize) -> (Self, Receiver<ResultPayload>) {
        let (sender, receiver) = bounded(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Enqueue without blocking; returns `false` if the payload was dropped.
    pub fn offer(&self, payload: ResultPayload) -> bool {
        match self.sender.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(payload)) => {
                tracing::warn!(
                    "Result queue full, dropping result for {} ({})",
                    payload.target,
                    payload.time
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("Result dispatcher gone, dropping result");
                false
            }
        }
    }
}

pub struct ResultDispatcher {
    server: Arc<dyn RemoteServer>,
    state: Arc<SharedState>,
    event_bus: EventBus,
}

impl ResultDispatcher {
    pub fn new(server: Arc<dyn RemoteServer>, state: Arc<SharedState>, event_bus: EventBus) -> Self {
        Self {
            server,
            state,
            event_bus,
        }
    }

    /// Upload one payload and fold the outcome into the connectivity flag.
    pub fn send(&self, payload: &ResultPayload) -> bool {
        let result = self.server.upload_result(payload);
        match &result {
            Ok(()) => tracing::info!(
                "✓ Result sent: {} score {:?}",
                payload.target,
                payload.score
            ),
            Err(err) => tracing::warn!("Failed to send result: {err}"),
        }
        record_outcome(&self.state, &self.event_bus, result.is_ok(), "result dispatcher");
        result.is_ok()
    }

    pub fn start(
        self,
        results: Receiver<ResultPayload>,
        poll_interval: Duration,
    ) -> std::io::Result<JoinHandle<()>> {
        spawn_named("result-dispatcher", move || {
            tracing::info!("Result dispatcher started");
            while self.state.is_running() {
                match results.recv_timeout(poll_interval) {
                    Ok(payload) => {
                        self.send(&payload);
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            tracing::info!("Result dispatcher stopped");
        })
    }
}
