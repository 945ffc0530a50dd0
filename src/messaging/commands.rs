/// Remote command types
///
/// Commands arrive from the server's `/get_command` endpoint and are
/// executed by the [`CommandExecutor`](super::executor::CommandExecutor).
use serde::{Deserialize, Deserializer, Serialize};

use crate::frame::AimPoint;

/// Device commands issued by the remote viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Command {
    /// Move the aim point; `null` resets it to the frame centre
    Center(Option<AimPoint>),

    /// Set the digital zoom factor
    Zoom(f32),
}

/// Body of a `/get_command` response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommandEnvelope {
    /// Server clock; present on every healthy response
    #[serde(default)]
    pub timestamp: Option<f64>,

    /// Pending command, if any. An unrecognised command is logged and
    /// dropped without invalidating the heartbeat.
    #[serde(default, deserialize_with = "lenient_command")]
    pub command: Option<Command>,
}

fn lenient_command<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Command>, D::Error> {
    let Some(raw) = Option::<serde_json::Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match Command::deserialize(&raw) {
        Ok(command) => Ok(Some(command)),
        Err(err) => {
            tracing::warn!("Ignoring unrecognised command {raw}: {err}");
            Ok(None)
        }
    }
}

impl Command {
    /// Get a human-readable description of the command
    pub fn description(&self) -> String {
        match self {
            Command::Center(Some(point)) => format!("Set aim to ({}, {})", point.x, point.y),
            Command::Center(None) => "Reset aim to frame centre".to_string(),
            Command::Zoom(zoom) => format!("Set zoom to {:.1}x", zoom),
        }
    }
}
