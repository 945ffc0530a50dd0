use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Score as sent on the wire: an integer, or `"--"` when the shot could not
/// be evaluated at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreValue {
    Points(u8),
    Unscored,
}

impl Serialize for ScoreValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScoreValue::Points(points) => serializer.serialize_u8(*points),
            ScoreValue::Unscored => serializer.serialize_str("--"),
        }
    }
}

/// One processed shot, as uploaded to `/processed_data_upload`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPayload {
    pub time: String,
    pub target: String,
    pub score: ScoreValue,
    /// Base64 of the annotated JPEG
    pub image_data: String,
}

impl ResultPayload {
    pub fn new(
        captured_at: DateTime<Local>,
        target: impl Into<String>,
        score: ScoreValue,
        jpeg: &[u8],
    ) -> Self {
        Self {
            time: captured_at.format(TIME_FORMAT).to_string(),
            target: target.into(),
            score,
            image_data: STANDARD.encode(jpeg),
        }
    }
}
