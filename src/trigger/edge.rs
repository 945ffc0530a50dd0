use std::fs;
use std::path::PathBuf;

use crate::error::TriggerError;
use crate::utils::{Debouncer, EdgeDetector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// A polled binary input line.
pub trait DigitalInput: Send {
    fn read(&mut self) -> Result<Level, TriggerError>;
}

/// GPIO line exported through sysfs (`/sys/class/gpio/gpioN/value`).
pub struct SysfsGpioInput {
    path: PathBuf,
}

impl SysfsGpioInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DigitalInput for SysfsGpioInput {
    fn read(&mut self) -> Result<Level, TriggerError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| TriggerError::InputUnreadable {
            path: self.path.display().to_string(),
            source,
        })?;

        match raw.trim() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(TriggerError::InvalidLevel(other.to_string())),
        }
    }
}

/// Fires on LOW→HIGH transitions of a digital input, debounced in time.
///
/// Sampled once per capture loop iteration; never blocks beyond the read.
pub struct EdgeTrigger {
    input: Box<dyn DigitalInput>,
    edge: EdgeDetector,
    debouncer: Debouncer,
    failing: bool,
}

impl EdgeTrigger {
    pub fn new(input: Box<dyn DigitalInput>, debounce_ms: u64) -> Self {
        Self {
            input,
            edge: EdgeDetector::new(),
            debouncer: Debouncer::new(debounce_ms),
            failing: false,
        }
    }

    /// Sample the input; true when a shot should be captured.
    pub fn poll(&mut self) -> bool {
        let level = match self.input.read() {
            Ok(level) => {
                if self.failing {
                    tracing::info!("✓ Trigger input readable again");
                    self.failing = false;
                }
                level
            }
            Err(err) => {
                if !self.failing {
                    tracing::warn!("Trigger input error: {err}");
                    self.failing = true;
                }
                return false;
            }
        };

        self.edge.rising(level == Level::High) && self.debouncer.should_trigger()
    }
}
