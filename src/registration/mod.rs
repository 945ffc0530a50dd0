/// Registration of a detected crop onto a target's canonical image
///
/// ```text
/// crop ──┐
///        ├─ ORB-style features ─ 2-NN Hamming both ways ─ ratio test ─ mutual filter
/// canon ─┘                                                                │
///                          RANSAC homography (crop → canonical) ◀─────────┘
///                                   │
///                 aim point mapped + crop warped to canonical size
/// ```
///
/// Failure anywhere yields [`RegistrationOutcome::Failed`]; it is a normal
/// result and the caller falls back to [`fallback_scale`].

pub mod features;
pub mod homography;
pub mod matching;
pub mod warp;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::AimPoint;
pub use features::{extract, Descriptor, Features, Keypoint};
pub use homography::{fit_ransac, Correspondence, Homography, HomographyError, RansacConfig};
pub use matching::{mutual_matches, Match};
pub use warp::warp_perspective;

/// Both images need at least this many keypoints to attempt a match.
pub const MIN_KEYPOINTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationParams {
    pub feature_budget: usize,
    pub pyramid_levels: usize,
    pub scale_factor: f32,
    pub fast_threshold: u8,
    pub ratio_threshold: f32,
    /// RANSAC reprojection threshold in canonical pixels
    pub ransac_threshold: f64,
    pub ransac_iterations: usize,
    /// Minimum mutual matches before a homography is attempted
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RegistrationParams {
    fn default() -> Self {
        Self {
            feature_budget: 1500,
            pyramid_levels: 4,
            scale_factor: 1.2,
            fast_threshold: 20,
            ratio_threshold: 0.75,
            ransac_threshold: 4.0,
            ransac_iterations: 2000,
            min_inliers: 10,
            seed: 0,
        }
    }
}

impl RegistrationParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.feature_budget < MIN_KEYPOINTS {
            return Err(format!(
                "registration.feature_budget must be at least {MIN_KEYPOINTS}"
            ));
        }
        if self.pyramid_levels == 0 {
            return Err("registration.pyramid_levels must be at least 1".into());
        }
        if !(self.scale_factor > 1.0) {
            return Err("registration.scale_factor must be greater than 1".into());
        }
        if !(self.ratio_threshold > 0.0 && self.ratio_threshold <= 1.0) {
            return Err("registration.ratio_threshold must be within (0, 1]".into());
        }
        if !(self.ransac_threshold > 0.0) {
            return Err("registration.ransac_threshold must be positive".into());
        }
        if self.ransac_iterations == 0 {
            return Err("registration.ransac_iterations must be at least 1".into());
        }
        Ok(())
    }

    fn ransac(&self) -> RansacConfig {
        RansacConfig {
            max_iterations: self.ransac_iterations,
            threshold: self.ransac_threshold,
            seed: self.seed,
            ..RansacConfig::default()
        }
    }
}

/// Why a crop could not be registered
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationFailure {
    #[error("not enough keypoints (canonical {canonical}, crop {crop})")]
    TooFewKeypoints { canonical: usize, crop: usize },

    #[error("only {found} mutual matches, need {needed}")]
    TooFewMatches { found: usize, needed: usize },

    #[error("homography fit failed: {0}")]
    Fit(#[from] HomographyError),

    #[error("homography is degenerate")]
    Degenerate,

    #[error("aim point does not map into the canonical plane")]
    Unmappable,
}

/// Result of registering one crop: both the warped crop and the mapped aim,
/// or neither.
#[derive(Debug, Clone)]
pub enum RegistrationOutcome {
    Registered {
        warped: RgbImage,
        /// Aim point in canonical coordinates
        aim: [f64; 2],
        inliers: usize,
    },
    Failed(RegistrationFailure),
}

impl RegistrationOutcome {
    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationOutcome::Registered { .. })
    }

    pub fn warped_crop(&self) -> Option<&RgbImage> {
        match self {
            RegistrationOutcome::Registered { warped, .. } => Some(warped),
            RegistrationOutcome::Failed(_) => None,
        }
    }

    pub fn canonical_aim(&self) -> Option<[f64; 2]> {
        match self {
            RegistrationOutcome::Registered { aim, .. } => Some(*aim),
            RegistrationOutcome::Failed(_) => None,
        }
    }
}

/// Canonical image with its features extracted once.
#[derive(Debug, Clone)]
pub struct Reference {
    pub image: RgbImage,
    pub features: Features,
}

impl Reference {
    pub fn new(image: RgbImage, params: &RegistrationParams) -> Self {
        let gray = image::DynamicImage::ImageRgb8(image.clone()).to_luma8();
        let features = extract(&gray, params);
        tracing::debug!("Reference features: {}", features.len());
        Self { image, features }
    }
}

/// Register `crop` onto `canonical`, extracting both feature sets in parallel.
pub fn register(
    canonical: &RgbImage,
    crop: &RgbImage,
    aim: AimPoint,
    params: &RegistrationParams,
) -> RegistrationOutcome {
    let (canonical_features, crop_features) = rayon::join(
        || extract(&to_gray(canonical), params),
        || extract(&to_gray(crop), params),
    );
    align(canonical, &canonical_features, crop, &crop_features, aim, params)
}

/// Register `crop` against a prepared reference.
pub fn register_with_reference(
    reference: &Reference,
    crop: &RgbImage,
    aim: AimPoint,
    params: &RegistrationParams,
) -> RegistrationOutcome {
    let crop_features = extract(&to_gray(crop), params);
    align(
        &reference.image,
        &reference.features,
        crop,
        &crop_features,
        aim,
        params,
    )
}

fn to_gray(image: &RgbImage) -> GrayImage {
    image::DynamicImage::ImageRgb8(image.clone()).to_luma8()
}

fn align(
    canonical: &RgbImage,
    canonical_features: &Features,
    crop: &RgbImage,
    crop_features: &Features,
    aim: AimPoint,
    params: &RegistrationParams,
) -> RegistrationOutcome {
    match try_align(canonical, canonical_features, crop, crop_features, aim, params) {
        Ok((warped, aim, inliers)) => {
            tracing::info!(
                "✓ Registered crop: aim -> ({:.1}, {:.1}), {} inliers",
                aim[0],
                aim[1],
                inliers
            );
            RegistrationOutcome::Registered {
                warped,
                aim,
                inliers,
            }
        }
        Err(failure) => {
            tracing::info!("Registration failed: {failure}");
            RegistrationOutcome::Failed(failure)
        }
    }
}

fn try_align(
    canonical: &RgbImage,
    canonical_features: &Features,
    crop: &RgbImage,
    crop_features: &Features,
    aim: AimPoint,
    params: &RegistrationParams,
) -> Result<(RgbImage, [f64; 2], usize), RegistrationFailure> {
    if canonical_features.len() < MIN_KEYPOINTS || crop_features.len() < MIN_KEYPOINTS {
        return Err(RegistrationFailure::TooFewKeypoints {
            canonical: canonical_features.len(),
            crop: crop_features.len(),
        });
    }

    let mutual = mutual_matches(
        &canonical_features.descriptors,
        &crop_features.descriptors,
        params.ratio_threshold,
    );
    if mutual.len() < params.min_inliers {
        return Err(RegistrationFailure::TooFewMatches {
            found: mutual.len(),
            needed: params.min_inliers,
        });
    }

    let pairs: Vec<Correspondence> = mutual
        .iter()
        .map(|m| {
            let c = &canonical_features.keypoints[m.query];
            let k = &crop_features.keypoints[m.train];
            Correspondence {
                src: [k.x as f64, k.y as f64],
                dst: [c.x as f64, c.y as f64],
            }
        })
        .collect();

    let fit = fit_ransac(&pairs, &params.ransac())?;
    if fit.homography.is_degenerate() {
        return Err(RegistrationFailure::Degenerate);
    }

    let mapped = fit
        .homography
        .project(aim.x as f64, aim.y as f64)
        .ok_or(RegistrationFailure::Unmappable)?;
    let warped = warp_perspective(crop, &fit.homography, canonical.width(), canonical.height())
        .ok_or(RegistrationFailure::Degenerate)?;

    Ok((warped, mapped, fit.inlier_count))
}

/// Approximate canonical position by stretching crop coordinates to the
/// canonical size. Used only when registration fails.
pub fn fallback_scale(aim: AimPoint, crop_size: (u32, u32), canonical_size: (u32, u32)) -> AimPoint {
    let scale = |v: i32, from: u32, to: u32| -> i32 {
        if from == 0 {
            return v;
        }
        (v as i64 * to as i64 / from as i64) as i32
    };
    AimPoint::new(
        scale(aim.x, crop_size.0, canonical_size.0),
        scale(aim.y, crop_size.1, canonical_size.1),
    )
}
