use chrono::{DateTime, Local};

use crate::frame::{AimPoint, Frame};
use crate::trigger::TriggerKind;

/// Everything the processing worker needs for one shot.
///
/// Built by the capture dispatcher from copies only: the frame is a deep
/// copy of the ring slot and the aim is a snapshot of the calibration.
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub frame: Frame,
    pub captured_at: DateTime<Local>,
    /// Calibrated aim at trigger time; `None` means the frame centre
    pub aim: Option<AimPoint>,
    pub source: TriggerKind,
}

impl ProcessingJob {
    pub fn aim_point(&self) -> AimPoint {
        self.aim.unwrap_or_else(|| self.frame.center())
    }
}
