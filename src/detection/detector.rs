/// Detector trait and common types
///
/// The object detector is an external model; this is its boundary.
use serde::Deserialize;

use crate::error::DetectionError;
use crate::frame::Frame;

/// Axis-aligned box in frame pixels, as reported by the model
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

/// One detected target face
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// Model class name, used to pick the target profile
    #[serde(default, rename = "name")]
    pub target_name: Option<String>,
}

impl Detection {
    pub fn new(bbox: [f32; 4], confidence: f32) -> Self {
        Self {
            bbox: bbox.into(),
            confidence,
            target_name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.target_name = Some(name.into());
        self
    }
}

/// Detector trait
///
/// Implementations must be callable from the processing worker thread.
pub trait Detector: Send + Sync {
    /// Detect target faces with at least `threshold` confidence
    fn detect(&self, frame: &Frame, threshold: f32) -> Result<Vec<Detection>, DetectionError>;

    /// Get detector name (for logging)
    fn name(&self) -> &'static str;

    /// Run one throwaway inference so the first real shot is not slow
    fn warm_up(&self, frame: &Frame) -> Result<(), DetectionError> {
        self.detect(frame, 1.0).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detector_response() {
        let detections: Vec<Detection> = serde_json::from_str(
            r#"[
                {"box": [100.2, 99.7, 300.0, 301.4], "confidence": 0.91, "name": "bia_so_4"},
                {"box": [0, 0, 10, 10], "confidence": 0.3}
            ]"#,
        )
        .unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].bbox.x1, 100.2);
        assert_eq!(detections[0].target_name.as_deref(), Some("bia_so_4"));
        assert_eq!(detections[1].target_name, None);
    }
}
