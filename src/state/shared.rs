use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::calibration::DeviceSettings;
use super::connectivity::ConnectivityState;
use crate::frame::AimPoint;

/// State shared by the capture loop and every worker.
///
/// Passed around as `Arc<SharedState>`; nothing here is process-global.
#[derive(Debug)]
pub struct SharedState {
    settings: Mutex<DeviceSettings>,
    connectivity: ConnectivityState,
    running: AtomicBool,
}

impl SharedState {
    pub fn new(settings: DeviceSettings) -> Self {
        Self {
            settings: Mutex::new(settings.clamped()),
            connectivity: ConnectivityState::default(),
            running: AtomicBool::new(true),
        }
    }

    /// Copy of the current calibration.
    pub fn settings(&self) -> DeviceSettings {
        *self.settings.lock()
    }

    /// Copy of the calibrated aim point, taken atomically with respect to
    /// command updates.
    pub fn aim_snapshot(&self) -> Option<AimPoint> {
        self.settings.lock().center
    }

    /// Apply `update` under the lock and return the new settings.
    pub fn update_settings(&self, update: impl FnOnce(&mut DeviceSettings)) -> DeviceSettings {
        let mut settings = self.settings.lock();
        update(&mut settings);
        *settings = settings.clamped();
        *settings
    }

    pub fn connectivity(&self) -> &ConnectivityState {
        &self.connectivity
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(DeviceSettings::default())
    }
}
