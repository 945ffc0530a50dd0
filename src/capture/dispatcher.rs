use std::sync::Arc;

use chrono::Local;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use super::ring_buffer::{FramePick, FrameRing};
use crate::messaging::{DropReason, Event, EventBus};
use crate::pipeline::ProcessingJob;
use crate::state::SharedState;
use crate::trigger::TriggerKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued,
    Dropped(DropReason),
}

/// Turns trigger events into processing jobs without ever blocking.
#[derive(Clone)]
pub struct CaptureDispatcher {
    ring: Arc<FrameRing>,
    state: Arc<SharedState>,
    jobs: Sender<ProcessingJob>,
    event_bus: EventBus,
}

impl CaptureDispatcher {
    /// Create the dispatcher together with the receiving end of the
    /// processing queue.
    pub fn new(
        ring: Arc<FrameRing>,
        state: Arc<SharedState>,
        capacity: usize,
        event_bus: EventBus,
    ) -> (Self, Receiver<ProcessingJob>) {
        let (jobs, rx) = bounded(capacity.max(1));
        (
            Self {
                ring,
                state,
                jobs,
                event_bus,
            },
            rx,
        )
    }

    pub fn ring(&self) -> &FrameRing {
        &self.ring
    }

    pub fn dispatch(&self, source: TriggerKind, pick: FramePick) -> DispatchOutcome {
        self.event_bus.publish(Event::TriggerFired { source });

        let Some(frame) = self.ring.snapshot(pick) else {
            tracing::warn!("Ring buffer empty, no frame to process");
            return self.dropped(DropReason::NoFrame);
        };

        let job = ProcessingJob {
            frame,
            captured_at: Local::now(),
            aim: self.state.aim_snapshot(),
            source,
        };

        match self.jobs.try_send(job) {
            Ok(()) => {
                tracing::debug!("Shot queued ({})", source.label());
                self.event_bus.publish(Event::JobQueued { source });
                DispatchOutcome::Queued
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Processing queue full, dropping shot");
                self.dropped(DropReason::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::error!("Processing worker gone, dropping shot");
                self.dropped(DropReason::WorkerGone)
            }
        }
    }

    fn dropped(&self, reason: DropReason) -> DispatchOutcome {
        self.event_bus.publish(Event::JobDropped { reason });
        DispatchOutcome::Dropped(reason)
    }
}
