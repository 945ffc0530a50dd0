use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::registration::RegistrationParams;
use crate::trigger::TriggerKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL of the viewer server
    pub server_url: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Per-request limit for `/get_command`
    pub poll_timeout_ms: u64,
    /// Per-request limit for preview frames
    pub frame_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            connect_timeout_ms: 2000,
            read_timeout_ms: 5000,
            poll_timeout_ms: 1000,
            frame_timeout_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Inference endpoint accepting a JPEG body
    pub url: String,
    pub confidence_threshold: f32,
    pub timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000/detect".to_string(),
            confidence_threshold: 0.6,
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Directory holding one sub-directory per target profile
    pub dir: PathBuf,
    /// Profile used when the detector does not name the target
    pub default_target: String,
    /// Raw frames of opted-in profiles land in `<training_dir>/<profile>/`
    pub training_dir: PathBuf,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("targets"),
            default_target: "bia_so_4".to_string(),
            training_dir: PathBuf::from("data_image"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub processing: usize,
    pub preview: usize,
    pub results: usize,
    pub commands: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            processing: 5,
            preview: 10,
            results: 8,
            commands: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Receive timeout of every worker loop
    pub worker_poll_ms: u64,
    pub command_poll_ms: u64,
    pub heartbeat_grace_ms: u64,
    /// Upper bound of the trigger device search backoff
    pub trigger_search_ms: u64,
    /// Pause after a trigger device read error
    pub trigger_reconnect_ms: u64,
    /// Capture loop pacing
    pub capture_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            worker_poll_ms: 100,
            command_poll_ms: 2000,
            heartbeat_grace_ms: 5000,
            trigger_search_ms: 5000,
            trigger_reconnect_ms: 2000,
            capture_interval_ms: 10,
        }
    }
}

impl TimingConfig {
    pub fn worker_poll(&self) -> Duration {
        Duration::from_millis(self.worker_poll_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: 480,
            height: 640,
            jpeg_quality: 75,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory of frames replayed as the camera stream
    pub frames_dir: PathBuf,
    pub ring_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::from("frames"),
            ring_capacity: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeTriggerConfig {
    /// Sysfs GPIO value file, e.g. `/sys/class/gpio/gpio17/value`
    pub gpio_path: Option<PathBuf>,
    pub debounce_ms: u64,
}

impl Default for EdgeTriggerConfig {
    fn default() -> Self {
        Self {
            gpio_path: None,
            debounce_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteTriggerConfig {
    pub enabled: bool,
    /// Name fragment identifying the shutter remote
    pub device_keyword: String,
    pub key: TriggerKey,
}

impl Default for RemoteTriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device_keyword: "AB Shutter3".to_string(),
            key: TriggerKey::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub edge: EdgeTriggerConfig,
    pub remote: RemoteTriggerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub detector: DetectorConfig,
    pub targets: TargetsConfig,
    pub queues: QueueConfig,
    pub timing: TimingConfig,
    pub stream: StreamConfig,
    pub capture: CaptureConfig,
    pub trigger: TriggerConfig,
    pub registration: RegistrationParams,

    /// Persisted `{zoom, center}` calibration document
    pub calibration_path: PathBuf,

    /// WAV cues; audio is disabled when unset
    pub sounds_dir: Option<PathBuf>,

    /// Per-shot image dump for diagnostics
    pub debug_dir: Option<PathBuf>,

    /// Keep results in memory instead of talking to the server
    pub offline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            detector: DetectorConfig::default(),
            targets: TargetsConfig::default(),
            queues: QueueConfig::default(),
            timing: TimingConfig::default(),
            stream: StreamConfig::default(),
            capture: CaptureConfig::default(),
            trigger: TriggerConfig::default(),
            registration: RegistrationParams::default(),
            calibration_path: PathBuf::from("device_config.json"),
            sounds_dir: Some(PathBuf::from("sounds")),
            debug_dir: None,
            offline: false,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `<exe_dir>/config/config.json`.
    /// Creates default config if file doesn't exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        let config = if config_path.exists() {
            let content =
                fs::read_to_string(&config_path).map_err(|e| ConfigError::LoadFailed {
                    path: config_path.display().to_string(),
                    source: Box::new(e),
                })?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: config_path.display().to_string(),
                    source: Box::new(e),
                })?;
            tracing::info!("✓ Loaded config from: {}", config_path.display());
            config
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            tracing::info!("✓ Created default config at: {}", config_path.display());
            tracing::info!("  Edit this file to customize settings.");
            config
        };

        config.validate()?;
        Ok(config.resolve_relative_to(config_path.parent()))
    }

    /// Save configuration to disk
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let save_err = |source: Box<dyn std::error::Error + Send + Sync>| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| save_err(Box::new(e)))?;
            }
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| save_err(Box::new(e)))?;
        fs::write(path, json).map_err(|e| save_err(Box::new(e)))?;
        Ok(())
    }

    /// Get the config file path (in app's base directory)
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let exe_path = env::current_exe().map_err(|_| ConfigError::NoExecutableDir)?;
        let exe_dir = exe_path.parent().ok_or(ConfigError::NoExecutableDir)?;
        Ok(exe_dir.join("config").join("config.json"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.detector.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "detector.confidence_threshold must be within [0, 1], got {threshold}"
            )));
        }

        let queues = [
            ("processing", self.queues.processing),
            ("preview", self.queues.preview),
            ("results", self.queues.results),
            ("commands", self.queues.commands),
            ("ring", self.capture.ring_capacity),
        ];
        if let Some((name, _)) = queues.iter().find(|(_, capacity)| *capacity == 0) {
            return Err(ConfigError::Invalid(format!(
                "{name} capacity must be at least 1"
            )));
        }

        if self.stream.width == 0 || self.stream.height == 0 {
            return Err(ConfigError::Invalid("stream size must be non-zero".into()));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "stream.jpeg_quality must be within 1..=100, got {}",
                self.stream.jpeg_quality
            )));
        }

        self.registration.validate().map_err(ConfigError::Invalid)
    }

    /// Relative paths in the document are relative to the document itself.
    fn resolve_relative_to(mut self, base: Option<&Path>) -> Self {
        let Some(base) = base.filter(|b| !b.as_os_str().is_empty()) else {
            return self;
        };
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        resolve(&mut self.targets.dir);
        resolve(&mut self.targets.training_dir);
        resolve(&mut self.capture.frames_dir);
        resolve(&mut self.calibration_path);
        if let Some(dir) = self.sounds_dir.as_mut() {
            resolve(dir);
        }
        if let Some(dir) = self.debug_dir.as_mut() {
            resolve(dir);
        }
        self
    }
}
