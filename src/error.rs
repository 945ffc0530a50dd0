use thiserror::Error;

/// Subsystem errors using thiserror for structured error handling.
///
/// Only real failures live here. A missed shot, a failed registration or a
/// zero score are ordinary results and never surface as one of these.

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not determine the executable directory")]
    NoExecutableDir,
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Frame source directory not found: {0}")]
    SourceNotFound(String),

    #[error("Frame source has no readable images in {0}")]
    NoFrames(String),

    #[error("Failed to read frame source")]
    ReadFailed(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Detector endpoint unreachable")]
    Unavailable(#[source] Box<ureq::Error>),

    #[error("Detector returned an unreadable response")]
    BadResponse(#[source] std::io::Error),

    #[error("Failed to encode frame for the detector")]
    Encode(#[from] EncodeError),
}

#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Trigger input {path} could not be read")]
    InputUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected trigger input value: {0:?}")]
    InvalidLevel(String),

    #[error("Trigger device disconnected")]
    Disconnected,

    #[error("Failed to grab trigger device: {0}")]
    GrabFailed(String),
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Request to {endpoint} failed")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("Server answered {endpoint} with status {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("Unreadable response from {endpoint}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to read target profile {path}")]
    Read {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to load image {path}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Zone mask is {mask:?} but canonical image is {canonical:?}")]
    MaskSizeMismatch {
        mask: (u32, u32),
        canonical: (u32, u32),
    },

    #[error("Invalid ring table: {0}")]
    InvalidRings(String),

    #[error("Unknown target profile: {0}")]
    NotFound(String),
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio output device available")]
    NoDevice(#[from] rodio::StreamError),

    #[error("Failed to start playback")]
    Playback(#[from] rodio::PlayError),

    #[error("Failed to decode sound")]
    Decode(#[from] rodio::decoder::DecoderError),
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("JPEG encoding failed")]
    Jpeg(#[source] image::ImageError),
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = TriggerError::Disconnected;
        assert_eq!(err.to_string(), "Trigger device disconnected");

        let err = NetworkError::Status {
            endpoint: "/get_command",
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "Server answered /get_command with status 503"
        );
    }

    #[test]
    fn test_error_source_chain() {
        use std::io;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let config_err = ConfigError::LoadFailed {
            path: "/test/config.json".to_string(),
            source: Box::new(io_err),
        };

        assert!(config_err.source().is_some());
        assert_eq!(
            config_err.to_string(),
            "Failed to load configuration from /test/config.json"
        );
    }
}
