use std::path::PathBuf;

use image::RgbImage;

use super::profile::TargetProfile;
use crate::detection::{Hit, HitResult};
use crate::frame::AimPoint;
use crate::network::ScoreValue;
use crate::pipeline::annotate::{draw_marker, Marker};
use crate::pipeline::ProcessingJob;
use crate::registration::{fallback_scale, register_with_reference, RegistrationOutcome, RegistrationParams};
use crate::scoring;

pub const MISS_LABEL: &str = "No target hit";
pub const UNRESOLVED_LABEL: &str = "Unable to process";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotKind {
    /// `registered` is false when the point was only scaled from the crop
    Scored { points: u8, registered: bool },
    Missed,
    Unresolved,
}

/// What a handler produced for one shot, ready to encode and upload.
#[derive(Debug, Clone)]
pub struct ShotReport {
    pub target: String,
    pub kind: ShotKind,
    pub annotated: RgbImage,
    /// Crop warped into canonical coordinates, when registration succeeded
    pub warped: Option<RgbImage>,
}

impl ShotReport {
    pub fn score(&self) -> ScoreValue {
        match self.kind {
            ShotKind::Scored { points, .. } => ScoreValue::Points(points),
            ShotKind::Missed => ScoreValue::Points(0),
            ShotKind::Unresolved => ScoreValue::Unscored,
        }
    }
}

/// Per-target processing of a classified shot.
pub trait TargetHandler: Send + Sync {
    fn name(&self) -> &str;

    fn handle(&self, result: &HitResult, job: &ProcessingJob) -> ShotReport;
}

/// Annotates the raw frame at the aim point; used for every shot that did
/// not land on a target.
#[derive(Debug, Default, Clone, Copy)]
pub struct MissHandler;

impl TargetHandler for MissHandler {
    fn name(&self) -> &str {
        "miss"
    }

    fn handle(&self, result: &HitResult, job: &ProcessingJob) -> ShotReport {
        let (aim, kind, target) = match result {
            HitResult::Unresolved { aim, reason } => {
                tracing::warn!("Shot could not be processed: {reason}");
                (*aim, ShotKind::Unresolved, UNRESOLVED_LABEL)
            }
            HitResult::Miss { aim } => {
                tracing::info!("Shot missed at ({}, {})", aim.x, aim.y);
                (*aim, ShotKind::Missed, MISS_LABEL)
            }
            HitResult::Hit(hit) => {
                let aim = AimPoint::new(
                    hit.crop_origin.x + hit.relative_aim.x,
                    hit.crop_origin.y + hit.relative_aim.y,
                );
                (aim, ShotKind::Missed, MISS_LABEL)
            }
        };

        let mut annotated = job.frame.image.clone();
        draw_marker(&mut annotated, aim, Marker::Aim);
        ShotReport {
            target: target.to_string(),
            kind,
            annotated,
            warped: None,
        }
    }
}

/// A ringed target face: register the crop, score in canonical coordinates
/// and draw the impact on a clean copy of the canonical image.
pub struct RingTarget {
    profile: TargetProfile,
    params: RegistrationParams,
    training_dir: Option<PathBuf>,
}

impl RingTarget {
    pub fn new(profile: TargetProfile, params: RegistrationParams) -> Self {
        Self {
            profile,
            params,
            training_dir: None,
        }
    }

    /// Raw frames are saved here when the profile opts in.
    pub fn with_training_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.training_dir = Some(dir.into());
        self
    }

    pub fn profile(&self) -> &TargetProfile {
        &self.profile
    }

    fn score_hit(&self, hit: &Hit) -> (u8, bool, [f64; 2], Option<RgbImage>) {
        let canonical_size = self.profile.canonical_size();
        let outcome = register_with_reference(
            &self.profile.reference,
            &hit.crop,
            hit.relative_aim,
            &self.params,
        );

        let (point, registered, warped) = match outcome {
            RegistrationOutcome::Registered { warped, aim, .. } => (aim, true, Some(warped)),
            RegistrationOutcome::Failed(_) => {
                let scaled = fallback_scale(hit.relative_aim, hit.crop.dimensions(), canonical_size);
                tracing::info!(
                    "Falling back to scaled point ({}, {}) for '{}'",
                    scaled.x,
                    scaled.y,
                    self.profile.name
                );
                ([scaled.x as f64, scaled.y as f64], false, None)
            }
        };

        let points = scoring::score(point, canonical_size, &self.profile.mask, &self.profile.rings);
        (points, registered, point, warped)
    }

    fn save_training_image(&self, job: &ProcessingJob) {
        let Some(dir) = self.training_dir.as_ref().filter(|_| self.profile.save_training_images)
        else {
            return;
        };
        let path = dir.join(format!("{}.jpg", job.captured_at.format("%Y%m%d_%H%M%S_%6f")));
        let result = std::fs::create_dir_all(dir)
            .map_err(image::ImageError::IoError)
            .and_then(|_| job.frame.image.save(&path));
        match result {
            Ok(()) => tracing::debug!("Saved training image {}", path.display()),
            Err(e) => tracing::warn!("Failed to save training image {}: {}", path.display(), e),
        }
    }
}

impl TargetHandler for RingTarget {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn handle(&self, result: &HitResult, job: &ProcessingJob) -> ShotReport {
        let HitResult::Hit(hit) = result else {
            return MissHandler.handle(result, job);
        };
        self.save_training_image(job);

        let (points, registered, point, warped) = self.score_hit(hit);
        let marker = if registered {
            Marker::Registered
        } else {
            Marker::Scaled
        };
        let mut annotated = self.profile.canonical().clone();
        draw_marker(
            &mut annotated,
            AimPoint::new(point[0].floor() as i32, point[1].floor() as i32),
            marker,
        );

        tracing::info!(
            "✓ '{}' scored {} ({})",
            self.profile.display_name,
            points,
            if registered { "registered" } else { "scaled" }
        );
        ShotReport {
            target: self.profile.display_name.clone(),
            kind: ShotKind::Scored { points, registered },
            annotated,
            warped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::pipeline::annotate::{RED, YELLOW};
    use crate::scoring::RingTable;
    use crate::trigger::TriggerKind;
    use image::{GrayImage, Luma, Rgb};

    fn job(image: RgbImage) -> ProcessingJob {
        let frame = Frame::new(image);
        ProcessingJob {
            captured_at: frame.captured_at,
            frame,
            aim: None,
            source: TriggerKind::Edge,
        }
    }

    fn flat_profile(save_training_images: bool) -> TargetProfile {
        TargetProfile::from_parts(
            "flat".into(),
            1,
            "Flat target".into(),
            RgbImage::from_pixel(200, 200, Rgb([128, 128, 128])),
            GrayImage::from_pixel(200, 200, Luma([255])),
            RingTable::standard(),
            save_training_images,
            &RegistrationParams::default(),
        )
        .unwrap()
    }

    fn hit_at(relative: AimPoint, crop: RgbImage) -> HitResult {
        HitResult::Hit(Hit {
            crop,
            crop_origin: AimPoint::new(0, 0),
            relative_aim: relative,
            target_name: None,
            confidence: 0.9,
        })
    }

    #[test]
    fn test_miss_and_unresolved_reports() {
        let job = job(RgbImage::new(100, 100));

        let miss = MissHandler.handle(&HitResult::Miss { aim: AimPoint::new(50, 50) }, &job);
        assert_eq!(miss.kind, ShotKind::Missed);
        assert_eq!(miss.score(), ScoreValue::Points(0));
        assert_eq!(miss.target, MISS_LABEL);
        assert_eq!(miss.annotated.get_pixel(50, 50), &RED);

        let unresolved = MissHandler.handle(
            &HitResult::Unresolved {
                aim: AimPoint::new(10, 10),
                reason: "detector offline".into(),
            },
            &job,
        );
        assert_eq!(unresolved.score(), ScoreValue::Unscored);
        assert_eq!(unresolved.target, UNRESOLVED_LABEL);
    }

    #[test]
    fn test_featureless_crop_falls_back_to_scaling() {
        let target = RingTarget::new(flat_profile(false), RegistrationParams::default());
        let crop = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));

        // Crop centre scales to canonical centre
        let report = target.handle(&hit_at(AimPoint::new(50, 50), crop), &job(RgbImage::new(300, 300)));

        assert_eq!(
            report.kind,
            ShotKind::Scored {
                points: 10,
                registered: false
            }
        );
        assert_eq!(report.target, "Flat target");
        assert!(report.warped.is_none());
        assert_eq!(report.annotated.dimensions(), (200, 200));
        assert_eq!(report.annotated.get_pixel(100, 100), &YELLOW);
    }

    #[test]
    fn test_non_hit_is_delegated_to_miss_handling() {
        let target = RingTarget::new(flat_profile(false), RegistrationParams::default());
        let report = target.handle(&HitResult::Miss { aim: AimPoint::new(5, 5) }, &job(RgbImage::new(20, 20)));
        assert_eq!(report.kind, ShotKind::Missed);
    }

    #[test]
    fn test_training_image_saved_when_enabled() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = RingTarget::new(flat_profile(true), RegistrationParams::default())
            .with_training_dir(tmp.path().join("training"));
        let crop = RgbImage::from_pixel(40, 40, Rgb([128, 128, 128]));

        target.handle(&hit_at(AimPoint::new(20, 20), crop), &job(RgbImage::new(60, 60)));

        let saved = std::fs::read_dir(tmp.path().join("training")).unwrap().count();
        assert_eq!(saved, 1);
    }
}
