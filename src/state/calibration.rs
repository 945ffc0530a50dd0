/// Persisted device calibration
///
/// The `{zoom, center}` document loaded at startup and rewritten after every
/// calibration or zoom command.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::frame::AimPoint;

pub const MIN_ZOOM: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Digital zoom factor, 1.0 = full sensor
    pub zoom: f32,

    /// Calibrated aim point; `None` means the frame centre
    pub center: Option<AimPoint>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            zoom: MIN_ZOOM,
            center: None,
        }
    }
}

impl DeviceSettings {
    /// Zoom below 1.0 is meaningless for a sensor crop.
    pub fn clamped(mut self) -> Self {
        if !self.zoom.is_finite() || self.zoom < MIN_ZOOM {
            self.zoom = MIN_ZOOM;
        }
        self
    }
}

/// Reads and writes [`DeviceSettings`] at a fixed path.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored settings, or defaults when the file does not exist yet.
    pub fn load(&self) -> Result<DeviceSettings, ConfigError> {
        if !self.path.exists() {
            tracing::info!(
                "No calibration at {}, using defaults",
                self.path.display()
            );
            return Ok(DeviceSettings::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| ConfigError::LoadFailed {
            path: self.path.display().to_string(),
            source: Box::new(e),
        })?;
        let settings: DeviceSettings =
            serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: self.path.display().to_string(),
                source: Box::new(e),
            })?;

        tracing::info!("✓ Loaded calibration from: {}", self.path.display());
        Ok(settings.clamped())
    }

    pub fn save(&self, settings: &DeviceSettings) -> Result<(), ConfigError> {
        let save_err = |source: Box<dyn std::error::Error + Send + Sync>| ConfigError::SaveFailed {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| save_err(Box::new(e)))?;
            }
        }

        let json = serde_json::to_string_pretty(settings).map_err(|e| save_err(Box::new(e)))?;
        fs::write(&self.path, json).map_err(|e| save_err(Box::new(e)))?;

        tracing::debug!("Saved calibration to: {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let settings = DeviceSettings {
            zoom: 2.5,
            center: Some(AimPoint::new(240, 310)),
        };
        let json = serde_json::to_value(settings).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"zoom": 2.5, "center": {"x": 240, "y": 310}})
        );

        let reset: DeviceSettings =
            serde_json::from_str(r#"{"zoom": 1.0, "center": null}"#).unwrap();
        assert_eq!(reset.center, None);
    }

    #[test]
    fn test_zoom_is_clamped() {
        let settings = DeviceSettings {
            zoom: 0.3,
            center: None,
        };
        assert_eq!(settings.clamped().zoom, MIN_ZOOM);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path().join("device.json"));
        assert_eq!(store.load().unwrap(), DeviceSettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path().join("nested").join("device.json"));
        let settings = DeviceSettings {
            zoom: 5.0,
            center: Some(AimPoint::new(12, 34)),
        };

        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);
    }
}
