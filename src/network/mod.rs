/// Remote server communication
///
/// Three workers talk to the viewer server: the result dispatcher, the
/// preview stream sender and the command poller. All of them share one
/// connectivity flag in [`SharedState`] and follow the same discipline:
/// bounded queues, explicit timeouts, and idempotent flag transitions.

pub mod client;
pub mod dispatcher;
pub mod memory;
pub mod payload;
pub mod poller;
pub mod stream;

pub use client::{HttpServer, RemoteServer};
pub use dispatcher::{ResultDispatcher, ResultQueue};
pub use memory::MemoryServer;
pub use payload::{ResultPayload, ScoreValue};
pub use poller::{CommandPoller, PollOutcome};
pub use stream::{PreviewQueue, StreamOutcome, StreamSender};

use crate::messaging::{Event, EventBus};
use crate::state::SharedState;

/// Fold one communication outcome into the shared connectivity flag,
/// publishing an event only on a real transition.
pub fn record_outcome(state: &SharedState, bus: &EventBus, ok: bool, reporter: &str) {
    if state.connectivity().set(ok, reporter) {
        bus.publish(Event::ConnectivityChanged { connected: ok });
    }
}
