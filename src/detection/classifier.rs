use image::RgbImage;

use super::detector::Detection;
use crate::frame::{AimPoint, Frame};

/// A detection that contains the aim point.
#[derive(Debug, Clone)]
pub struct Hit {
    /// Frame pixels inside the detection box
    pub crop: RgbImage,
    /// Top-left of the crop in frame coordinates
    pub crop_origin: AimPoint,
    /// Aim point in crop coordinates
    pub relative_aim: AimPoint,
    pub target_name: Option<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub enum HitResult {
    Hit(Hit),
    /// Aim on no qualifying box; the aim is kept for annotation
    Miss { aim: AimPoint },
    /// The frame could not be evaluated at all
    Unresolved { aim: AimPoint, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitStatus {
    Hit,
    Miss,
    Unresolved,
}

impl HitResult {
    pub fn status(&self) -> HitStatus {
        match self {
            HitResult::Hit(_) => HitStatus::Hit,
            HitResult::Miss { .. } => HitStatus::Miss,
            HitResult::Unresolved { .. } => HitStatus::Unresolved,
        }
    }
}

/// Decide whether `aim` lands on a detected target.
///
/// Detections are taken in the order given and the first box that contains
/// the aim (bounds inclusive, after rounding) wins, even if a later box has
/// a higher confidence.
pub fn classify(
    detections: &[Detection],
    frame: &Frame,
    aim: AimPoint,
    threshold: f32,
) -> HitResult {
    let (ax, ay) = (aim.x as i64, aim.y as i64);

    for detection in detections.iter().filter(|d| d.confidence >= threshold) {
        let b = detection.bbox;
        let [x1, y1, x2, y2] = [b.x1, b.y1, b.x2, b.y2].map(|v| v.round_ties_even() as i64);

        if x2 <= x1 || y2 <= y1 {
            continue;
        }
        if !(x1 <= ax && ax <= x2 && y1 <= ay && ay <= y2) {
            continue;
        }

        let Some((crop, crop_origin)) = frame.crop(x1, y1, x2, y2) else {
            continue;
        };
        tracing::info!(
            "✓ Hit: aim ({}, {}) inside {:?} ({:.2})",
            aim.x,
            aim.y,
            detection.target_name.as_deref().unwrap_or("target"),
            detection.confidence
        );
        return HitResult::Hit(Hit {
            crop,
            crop_origin,
            relative_aim: aim.offset_from(crop_origin),
            target_name: detection.target_name.clone(),
            confidence: detection.confidence,
        });
    }

    tracing::info!("Miss: aim ({}, {}) is on no target", aim.x, aim.y);
    HitResult::Miss { aim }
}
