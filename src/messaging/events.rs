/// Event types for the scoring device
///
/// Events represent things that have happened (past tense).
/// They are broadcast to all subscribers.
use crate::frame::AimPoint;
use crate::trigger::{TriggerKind, TriggerState};

/// Application events
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Workers are up and the capture loop is running
    Started,

    /// A trigger fired (before the job is queued)
    TriggerFired { source: TriggerKind },

    /// A processing job was accepted by the queue
    JobQueued { source: TriggerKind },

    /// A processing job could not be queued
    JobDropped { reason: DropReason },

    /// A hit was scored against a target profile
    ShotScored {
        target: String,
        score: u8,
        registered: bool,
    },

    /// The aim point was not on any detected target
    ShotMissed,

    /// The frame could not be processed (detector unavailable)
    ShotUnresolved,

    /// The shared connectivity flag changed
    ConnectivityChanged { connected: bool },

    /// Aim calibration or zoom changed by a remote command
    CalibrationChanged {
        zoom: f32,
        center: Option<AimPoint>,
    },

    /// Wireless trigger state machine moved
    TriggerDeviceChanged { state: TriggerState },

    /// Application is shutting down
    Shutdown,
}

/// Why a job never reached the processing queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    QueueFull,
    NoFrame,
    WorkerGone,
}

impl Event {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            Event::Started => "System ready".to_string(),
            Event::TriggerFired { source } => format!("Trigger fired ({})", source.label()),
            Event::JobQueued { source } => format!("Shot queued ({})", source.label()),
            Event::JobDropped { reason } => format!("Shot dropped: {:?}", reason),
            Event::ShotScored {
                target,
                score,
                registered,
            } => {
                let mode = if *registered { "registered" } else { "scaled" };
                format!("{} scored {} ({})", target, score, mode)
            }
            Event::ShotMissed => "Shot missed".to_string(),
            Event::ShotUnresolved => "Shot could not be processed".to_string(),
            Event::ConnectivityChanged { connected } => {
                if *connected {
                    "Server connected".to_string()
                } else {
                    "Server disconnected".to_string()
                }
            }
            Event::CalibrationChanged { zoom, center } => match center {
                Some(c) => format!("Calibration: zoom {:.1}x, aim ({}, {})", zoom, c.x, c.y),
                None => format!("Calibration: zoom {:.1}x, aim at frame centre", zoom),
            },
            Event::TriggerDeviceChanged { state } => {
                format!("Trigger device: {}", state.description())
            }
            Event::Shutdown => "Shutting down".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_description() {
        let event = Event::ShotScored {
            target: "bia_so_4".to_string(),
            score: 9,
            registered: false,
        };
        assert_eq!(event.description(), "bia_so_4 scored 9 (scaled)");

        let event = Event::CalibrationChanged {
            zoom: 2.0,
            center: None,
        };
        assert_eq!(
            event.description(),
            "Calibration: zoom 2.0x, aim at frame centre"
        );
    }
}
