use std::time::Duration;

use super::detector::{Detection, Detector};
use crate::config::DetectorConfig;
use crate::error::DetectionError;
use crate::frame::Frame;
use crate::pipeline::annotate::encode_jpeg;

const UPLOAD_QUALITY: u8 = 90;

/// Detector served over HTTP: the frame is posted as a JPEG body and the
/// endpoint answers with `[{"box": [x1, y1, x2, y2], "confidence": f, "name": s}]`.
pub struct HttpDetector {
    url: String,
    agent: ureq::Agent,
}

impl HttpDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        Self {
            url: config.url.clone(),
            agent,
        }
    }
}

impl Detector for HttpDetector {
    fn detect(&self, frame: &Frame, threshold: f32) -> Result<Vec<Detection>, DetectionError> {
        let jpeg = encode_jpeg(&frame.image, UPLOAD_QUALITY)?;

        let response = self
            .agent
            .post(&self.url)
            .query("conf", &threshold.to_string())
            .set("Content-Type", "image/jpeg")
            .send_bytes(&jpeg)
            .map_err(|e| DetectionError::Unavailable(Box::new(e)))?;

        let detections: Vec<Detection> =
            response.into_json().map_err(DetectionError::BadResponse)?;
        tracing::debug!("{} detections from {}", detections.len(), self.url);
        Ok(detections)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
