/// Preview stream sender
///
/// Ships annotated preview JPEGs to `/video_upload`. While the server is
/// marked disconnected the sender keeps draining its queue without sending,
/// so capture never backs up behind a dead link.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use super::{record_outcome, RemoteServer};
use crate::messaging::EventBus;
use crate::state::SharedState;
use crate::utils::spawn_named;

/// Producer side of the preview queue.
#[derive(Clone)]
pub struct PreviewQueue {
    sender: Sender<Vec<u8>>,
}

impl PreviewQueue {
    pub fn bounded(capacity: usize) -> (Self, Receiver<Vec<u8>>) {
        let (sender, receiver) = bounded(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Lets the capture loop skip annotating and encoding a frame that
    /// would be dropped anyway.
    pub fn has_room(&self) -> bool {
        !self.sender.is_full()
    }

    pub fn offer(&self, jpeg: Vec<u8>) -> bool {
        match self.sender.try_send(jpeg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

pub struct StreamSender {
    server: Arc<dyn RemoteServer>,
    state: Arc<SharedState>,
    event_bus: EventBus,
}

/// What happened to one preview frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Sent,
    Failed,
    Skipped,
}

impl StreamSender {
    pub fn new(server: Arc<dyn RemoteServer>, state: Arc<SharedState>, event_bus: EventBus) -> Self {
        Self {
            server,
            state,
            event_bus,
        }
    }

    pub fn send(&self, jpeg: &[u8]) -> StreamOutcome {
        if !self.state.connectivity().is_connected() {
            return StreamOutcome::Skipped;
        }

        match self.server.upload_frame(jpeg) {
            Ok(()) => {
                record_outcome(&self.state, &self.event_bus, true, "stream");
                StreamOutcome::Sent
            }
            Err(err) => {
                tracing::debug!("Preview frame not sent: {err}");
                record_outcome(&self.state, &self.event_bus, false, "stream");
                StreamOutcome::Failed
            }
        }
    }

    pub fn start(
        self,
        frames: Receiver<Vec<u8>>,
        poll_interval: Duration,
    ) -> std::io::Result<JoinHandle<()>> {
        spawn_named("stream-sender", move || {
            tracing::info!("Stream sender started");
            let mut sent = 0u64;
            let mut skipped = 0u64;

            while self.state.is_running() {
                match frames.recv_timeout(poll_interval) {
                    Ok(jpeg) => match self.send(&jpeg) {
                        StreamOutcome::Sent => sent += 1,
                        StreamOutcome::Skipped => skipped += 1,
                        StreamOutcome::Failed => {}
                    },
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            tracing::info!(
                "Stream sender stopped ({} frames sent, {} skipped while offline)",
                sent,
                skipped
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::MemoryServer;

    fn sender(server: &Arc<MemoryServer>, state: &Arc<SharedState>) -> StreamSender {
        StreamSender::new(server.clone(), state.clone(), EventBus::new())
    }

    #[test]
    fn test_paused_while_disconnected() {
        let server = Arc::new(MemoryServer::default());
        let state = Arc::new(SharedState::default());
        let sender = sender(&server, &state);

        state.connectivity().set(false, "test");
        assert_eq!(sender.send(b"jpeg"), StreamOutcome::Skipped);
        assert_eq!(server.frame_count(), 0);

        state.connectivity().set(true, "test");
        assert_eq!(sender.send(b"jpeg"), StreamOutcome::Sent);
        assert_eq!(server.frame_count(), 1);
    }

    #[test]
    fn test_failure_marks_disconnected() {
        let server = Arc::new(MemoryServer::default());
        let state = Arc::new(SharedState::default());
        let sender = sender(&server, &state);

        server.set_online(false);
        assert_eq!(sender.send(b"jpeg"), StreamOutcome::Failed);
        assert!(!state.connectivity().is_connected());
        assert_eq!(sender.send(b"jpeg"), StreamOutcome::Skipped);
    }

    #[test]
    fn test_preview_queue_reports_room() {
        let (queue, rx) = PreviewQueue::bounded(1);
        assert!(queue.has_room());
        assert!(queue.offer(vec![1]));
        assert!(!queue.has_room());
        assert!(!queue.offer(vec![2]));
        assert_eq!(rx.try_recv().unwrap(), vec![1]);
    }
}
