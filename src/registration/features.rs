/// Oriented FAST keypoints with rotated BRIEF descriptors
///
/// Keypoints are found on a small image pyramid, ranked by Harris response,
/// thinned by 3×3 non-maximum suppression and capped to a per-level budget.
/// Each keypoint gets an intensity-centroid orientation and a 256-bit
/// binary descriptor sampled on a blurred copy of its level.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::corners::corners_fast9;
use imageproc::gradients::{horizontal_scharr, vertical_scharr};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::RegistrationParams;

/// Keypoints closer than this to the level edge are discarded; it covers the
/// orientation disc and the rotated sampling pattern.
pub const EDGE_BORDER: u32 = 16;

const ORIENTATION_RADIUS: i32 = 15;
const PATCH_RADIUS: f32 = 13.0;
const HARRIS_RADIUS: i32 = 3;
const HARRIS_K: f32 = 0.04;
const BRIEF_SIGMA: f32 = 2.0;
const DESCRIPTOR_BITS: usize = 256;
const PATTERN_SEED: u64 = 0x0B5E_55ED;
pub type Descriptor = [u64; 4];

/// Keypoint in full-resolution image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub level: usize,
    /// Orientation in radians
    pub angle: f32,
    pub response: f32,
}

/// Keypoints and their descriptors, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

pub fn extract(image: &GrayImage, params: &RegistrationParams) -> Features {
    let pattern = sampling_pattern();
    let budgets = level_budgets(params.feature_budget, params.pyramid_levels, params.scale_factor);
    let mut features = Features::default();

    for (level, budget) in budgets.into_iter().enumerate() {
        let scale = params.scale_factor.powi(level as i32);
        let width = (image.width() as f32 / scale).round() as u32;
        let height = (image.height() as f32 / scale).round() as u32;
        if width <= 2 * EDGE_BORDER || height <= 2 * EDGE_BORDER {
            break;
        }

        let resized;
        let level_image = if level == 0 {
            image
        } else {
            resized = imageops::resize(image, width, height, FilterType::Triangle);
            &resized
        };

        let corners = detect_corners(level_image, params.fast_threshold, budget);
        if corners.is_empty() {
            continue;
        }
        let blurred = imageops::blur(level_image, BRIEF_SIGMA);

        for (x, y, response) in corners {
            let angle = orientation(level_image, x, y);
            features.descriptors.push(describe(&blurred, x, y, angle, &pattern));
            features.keypoints.push(Keypoint {
                x: x as f32 * scale,
                y: y as f32 * scale,
                level,
                angle,
                response,
            });
        }
    }

    features
}

/// Split the feature budget geometrically across pyramid levels.
fn level_budgets(total: usize, levels: usize, scale: f32) -> Vec<usize> {
    let levels = levels.max(1);
    if levels == 1 {
        return vec![total];
    }

    let factor = 1.0 / scale as f64;
    let first = total as f64 * (1.0 - factor) / (1.0 - factor.powi(levels as i32));
    let mut budgets: Vec<usize> = (0..levels - 1)
        .map(|k| (first * factor.powi(k as i32)).round() as usize)
        .collect();
    let assigned: usize = budgets.iter().sum();
    budgets.push(total.saturating_sub(assigned));
    budgets
}

type Gradient = ImageBuffer<Luma<i16>, Vec<i16>>;

/// FAST-9 corners ranked by Harris response after 3×3 non-maximum suppression.
fn detect_corners(image: &GrayImage, threshold: u8, budget: usize) -> Vec<(u32, u32, f32)> {
    let (width, height) = image.dimensions();
    let gx = horizontal_scharr(image);
    let gy = vertical_scharr(image);

    let (xs, ys) = (EDGE_BORDER..width - EDGE_BORDER, EDGE_BORDER..height - EDGE_BORDER);
    let mut fast: Vec<(u32, u32)> = corners_fast9(image, threshold)
        .into_iter()
        .filter(|c| xs.contains(&c.x) && ys.contains(&c.y))
        .map(|c| (c.x, c.y))
        .collect();
    // Scan order, so NMS ties resolve the same way on every run
    fast.sort_unstable_by_key(|&(x, y)| (y, x));

    let candidates: Vec<(u32, u32, f32)> = fast
        .into_par_iter()
        .map(|(x, y)| (x, y, harris_response(&gx, &gy, x, y)))
        .collect();

    let mut response_map = vec![f32::NEG_INFINITY; (width * height) as usize];
    for &(x, y, r) in &candidates {
        response_map[(y * width + x) as usize] = r;
    }

    let mut kept: Vec<(u32, u32, f32)> = candidates
        .into_iter()
        .filter(|&(x, y, r)| {
            let own = (y * width + x) as usize;
            (-1i32..=1).all(|dy| {
                (-1i32..=1).all(|dx| {
                    let idx = ((y as i32 + dy) as u32 * width + (x as i32 + dx) as u32) as usize;
                    // Equal neighbours: the earlier one in scan order survives
                    idx == own || response_map[idx] < r || (response_map[idx] == r && idx > own)
                })
            })
        })
        .collect();

    kept.sort_by(|a, b| b.2.total_cmp(&a.2));
    kept.truncate(budget);
    kept
}

/// Harris score from the Scharr structure tensor over a square window.
fn harris_response(gx: &Gradient, gy: &Gradient, x: u32, y: u32) -> f32 {
    let (x, y) = (x as i32, y as i32);
    let (mut sxx, mut syy, mut sxy) = (0.0f32, 0.0f32, 0.0f32);

    for wy in y - HARRIS_RADIUS..=y + HARRIS_RADIUS {
        for wx in x - HARRIS_RADIUS..=x + HARRIS_RADIUS {
            let ix = gx.get_pixel(wx as u32, wy as u32)[0] as f32;
            let iy = gy.get_pixel(wx as u32, wy as u32)[0] as f32;
            sxx += ix * ix;
            syy += iy * iy;
            sxy += ix * iy;
        }
    }

    let trace = sxx + syy;
    sxx * syy - sxy * sxy - HARRIS_K * trace * trace
}

/// Intensity-centroid angle over a disc around the keypoint.
fn orientation(image: &GrayImage, x: u32, y: u32) -> f32 {
    let (mut m10, mut m01) = (0.0f32, 0.0f32);
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        let span = ((ORIENTATION_RADIUS * ORIENTATION_RADIUS - dy * dy) as f32).sqrt() as i32;
        for dx in -span..=span {
            let v = image.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as f32;
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    m01.atan2(m10)
}

fn describe(
    blurred: &GrayImage,
    x: u32,
    y: u32,
    angle: f32,
    pattern: &[[(f32, f32); 2]],
) -> Descriptor {
    let (sin, cos) = angle.sin_cos();
    let sample = |(px, py): (f32, f32)| {
        let rx = (px * cos - py * sin).round() as i32;
        let ry = (px * sin + py * cos).round() as i32;
        blurred.get_pixel((x as i32 + rx) as u32, (y as i32 + ry) as u32)[0]
    };

    let mut descriptor = [0u64; 4];
    for (bit, &[a, b]) in pattern.iter().enumerate() {
        if sample(a) < sample(b) {
            descriptor[bit / 64] |= 1 << (bit % 64);
        }
    }
    descriptor
}

/// Fixed BRIEF test pairs inside the patch disc.
fn sampling_pattern() -> Vec<[(f32, f32); 2]> {
    let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
    let mut point = || loop {
        let x: f32 = rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS);
        let y: f32 = rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS);
        if x * x + y * y <= PATCH_RADIUS * PATCH_RADIUS {
            return (x, y);
        }
    };
    (0..DESCRIPTOR_BITS).map(|_| [point(), point()]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::test_support::textured_image;
    use image::Luma;

    #[test]
    fn test_blank_image_has_no_features() {
        let blank = GrayImage::from_pixel(200, 200, Luma([128]));
        let features = extract(&blank, &RegistrationParams::default());
        assert!(features.is_empty());
    }

    #[test]
    fn test_textured_image_features() {
        let image = textured_image(320, 320, 7);
        let params = RegistrationParams::default();
        let features = extract(&image, &params);

        assert!(features.len() > 50, "only {} keypoints", features.len());
        assert!(features.len() <= params.feature_budget);
        assert_eq!(features.keypoints.len(), features.descriptors.len());
        for kp in &features.keypoints {
            assert!(kp.x >= 0.0 && kp.x < 320.0 && kp.y >= 0.0 && kp.y < 320.0);
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let image = textured_image(240, 240, 3);
        let params = RegistrationParams::default();
        let a = extract(&image, &params);
        let b = extract(&image, &params);
        assert_eq!(a.keypoints, b.keypoints);
        assert_eq!(a.descriptors, b.descriptors);
    }

    #[test]
    fn test_single_corner_is_detected() {
        let mut image = GrayImage::from_pixel(64, 64, Luma([20]));
        for y in 32..64 {
            for x in 32..64 {
                image.put_pixel(x, y, Luma([220]));
            }
        }
        let corners = detect_corners(&image, 20, 100);
        assert!(corners
            .iter()
            .any(|&(x, y, _)| x.abs_diff(32) <= 2 && y.abs_diff(32) <= 2));
    }

    #[test]
    fn test_flat_edge_scores_below_corner() {
        let mut image = GrayImage::from_pixel(64, 64, Luma([20]));
        for y in 0..64 {
            for x in 32..64 {
                image.put_pixel(x, y, Luma([220]));
            }
        }
        image.put_pixel(20, 20, Luma([255]));
        let gx = horizontal_scharr(&image);
        let gy = vertical_scharr(&image);

        // A straight edge has one dominant gradient direction
        assert!(harris_response(&gx, &gy, 32, 32) <= 0.0);
        assert!(harris_response(&gx, &gy, 20, 20) > 0.0);
    }

    #[test]
    fn test_level_budgets_sum_to_total() {
        let budgets = level_budgets(1500, 4, 1.2);
        assert_eq!(budgets.len(), 4);
        assert_eq!(budgets.iter().sum::<usize>(), 1500);
        assert!(budgets.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_hamming() {
        let a = [0u64, 0, 0, 0];
        let b = [0b1011u64, 0, 0, u64::MAX];
        assert_eq!(hamming(&a, &b), 67);
        assert_eq!(hamming(&b, &b), 0);
    }
}
