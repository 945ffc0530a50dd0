/// Shot triggers
///
/// Two sources tell the device "capture now": a wired digital input sampled
/// by the capture loop, and a wireless shutter remote handled by its own
/// worker with an explicit device state machine.

pub mod edge;
pub mod remote;

pub use edge::{DigitalInput, EdgeTrigger, Level, SysfsGpioInput};
pub use remote::{
    KeyDevice, KeyDeviceProvider, KeyEvent, RdevKeyboardProvider, RemoteTiming, RemoteTrigger,
    TransitionError,
    TriggerKey, TriggerState, TriggerStateMachine,
};

/// Which trigger produced a shot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Edge,
    Remote,
}

impl TriggerKind {
    pub fn label(&self) -> &'static str {
        match self {
            TriggerKind::Edge => "edge",
            TriggerKind::Remote => "remote",
        }
    }
}
