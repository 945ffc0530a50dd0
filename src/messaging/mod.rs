/// Messaging module for Event/Command architecture
///
/// - **Events**: notifications of things that happened (past tense, broadcast)
/// - **Commands**: remote requests to change the device calibration
///
/// ## Architecture
///
/// ```text
/// ┌───────────────┐  Command   ┌──────────┐   Event    ┌─────────────┐
/// │ CommandPoller │ ─────────> │ Executor │ ─────────> │  Event Bus  │
/// └───────────────┘            └──────────┘            └─────────────┘
///                                                             │
///   capture loop, triggers, workers ──────── Event ──────────>│
///                                                             ▼
///                                                       ┌──────────┐
///                                                       │  Audio   │
///                                                       │  worker  │
///                                                       └──────────┘
/// ```

pub mod bus;
pub mod commands;
pub mod events;
pub mod executor;

// Re-export commonly used types
pub use bus::{EventBus, SubscriberId};
pub use commands::{Command, CommandEnvelope};
pub use events::{DropReason, Event};
pub use executor::CommandExecutor;
