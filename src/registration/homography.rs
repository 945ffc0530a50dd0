/// Planar homography: normalised DLT fit and a seeded RANSAC wrapper.

use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

/// Below this |det| the transform collapses the plane.
pub const DEGENERATE_DET: f64 = 1e-6;

const MIN_POINTS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HomographyError {
    #[error("need at least {needed} correspondences, got {got}")]
    TooFewPoints { needed: usize, got: usize },

    #[error("numerical failure: {0}")]
    Numerical(&'static str),

    #[error("only {found} inliers, need {needed}")]
    InsufficientInliers { needed: usize, found: usize },

    #[error("degenerate homography (det {0:e})")]
    Degenerate(f64),
}

/// A point pair `src → dst`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub src: [f64; 2],
    pub dst: [f64; 2],
}

/// 3×3 projective transform, normalised so that `h[2][2] == 1` when possible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(pub Matrix3<f64>);

impl Homography {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    /// Map a point; `None` if it lands on the line at infinity.
    pub fn project(&self, x: f64, y: f64) -> Option<[f64; 2]> {
        let p = self.0 * Vector3::new(x, y, 1.0);
        if p[2].abs() < 1e-12 {
            return None;
        }
        let out = [p[0] / p[2], p[1] / p[2]];
        (out[0].is_finite() && out[1].is_finite()).then_some(out)
    }

    pub fn transfer_error(&self, c: &Correspondence) -> f64 {
        match self.project(c.src[0], c.src[1]) {
            Some([u, v]) => ((u - c.dst[0]).powi(2) + (v - c.dst[1]).powi(2)).sqrt(),
            None => f64::INFINITY,
        }
    }

    pub fn determinant(&self) -> f64 {
        self.0.determinant()
    }

    /// Non-finite or (nearly) singular.
    pub fn is_degenerate(&self) -> bool {
        !self.0.iter().all(|v| v.is_finite()) || self.determinant().abs() < DEGENERATE_DET
    }

    pub fn inverse(&self) -> Option<Homography> {
        self.0.try_inverse().map(Homography)
    }

    /// Direct linear transform over all correspondences, with Hartley
    /// normalisation of both point sets.
    pub fn from_correspondences(pairs: &[Correspondence]) -> Result<Self, HomographyError> {
        if pairs.len() < MIN_POINTS {
            return Err(HomographyError::TooFewPoints {
                needed: MIN_POINTS,
                got: pairs.len(),
            });
        }

        let src: Vec<[f64; 2]> = pairs.iter().map(|c| c.src).collect();
        let dst: Vec<[f64; 2]> = pairs.iter().map(|c| c.dst).collect();
        let (t_src, src) = hartley_normalise(&src);
        let (t_dst, dst) = hartley_normalise(&dst);

        let mut a = DMatrix::<f64>::zeros(2 * pairs.len(), 9);
        for (i, (s, d)) in src.iter().zip(&dst).enumerate() {
            let (sx, sy, dx, dy) = (s[0], s[1], d[0], d[1]);
            let r = 2 * i;
            a[(r, 3)] = -sx;
            a[(r, 4)] = -sy;
            a[(r, 5)] = -1.0;
            a[(r, 6)] = dy * sx;
            a[(r, 7)] = dy * sy;
            a[(r, 8)] = dy;

            a[(r + 1, 0)] = sx;
            a[(r + 1, 1)] = sy;
            a[(r + 1, 2)] = 1.0;
            a[(r + 1, 6)] = -dx * sx;
            a[(r + 1, 7)] = -dx * sy;
            a[(r + 1, 8)] = -dx;
        }

        // Null vector of A = eigenvector of AᵀA with the smallest eigenvalue
        let eig = SymmetricEigen::new(a.transpose() * &a);
        let smallest = eig
            .eigenvalues
            .iter()
            .enumerate()
            .min_by(|x, y| x.1.abs().total_cmp(&y.1.abs()))
            .map(|(i, _)| i)
            .ok_or(HomographyError::Numerical("empty eigen decomposition"))?;
        let v = eig.eigenvectors.column(smallest);
        let h_norm = Matrix3::new(v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], v[8]);

        let t_dst_inv = t_dst
            .try_inverse()
            .ok_or(HomographyError::Numerical("normalisation not invertible"))?;
        let h = t_dst_inv * h_norm * t_src;

        let scale = h[(2, 2)];
        Ok(Homography(if scale.abs() < 1e-12 { h } else { h / scale }))
    }
}

/// Translate the centroid to the origin and scale the mean radius to √2.
fn hartley_normalise(points: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = points.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_radius = points
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_radius > 1e-12 {
        std::f64::consts::SQRT_2 / mean_radius
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalised = points.iter().map(|p| [s * (p[0] - cx), s * (p[1] - cy)]).collect();
    (t, normalised)
}

#[derive(Debug, Clone)]
pub struct RansacConfig {
    pub max_iterations: usize,
    /// Transfer error (pixels) below which a pair is an inlier
    pub threshold: f64,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            threshold: 4.0,
            min_inliers: MIN_POINTS,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacFit {
    pub homography: Homography,
    pub inliers: Vec<bool>,
    pub inlier_count: usize,
}

/// Robust fit: best minimal-sample model by inlier count, refit on its
/// inliers. Stops early once more than 90% of pairs agree.
pub fn fit_ransac(
    pairs: &[Correspondence],
    config: &RansacConfig,
) -> Result<RansacFit, HomographyError> {
    let n = pairs.len();
    if n < MIN_POINTS {
        return Err(HomographyError::TooFewPoints {
            needed: MIN_POINTS,
            got: n,
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let inliers_of = |h: &Homography| -> Vec<bool> {
        pairs
            .iter()
            .map(|c| h.transfer_error(c) < config.threshold)
            .collect()
    };

    let mut best: Option<(Homography, Vec<bool>, usize)> = None;
    for _ in 0..config.max_iterations {
        let sample: Vec<Correspondence> = rand::seq::index::sample(&mut rng, n, MIN_POINTS)
            .iter()
            .map(|i| pairs[i])
            .collect();
        let Ok(h) = Homography::from_correspondences(&sample) else {
            continue;
        };
        if h.is_degenerate() {
            continue;
        }

        let mask = inliers_of(&h);
        let count = mask.iter().filter(|&&m| m).count();
        if best.as_ref().map_or(true, |(_, _, c)| count > *c) {
            best = Some((h, mask, count));
            if count * 10 > n * 9 {
                break;
            }
        }
    }

    let (model, mask, count) = best.ok_or(HomographyError::InsufficientInliers {
        needed: config.min_inliers,
        found: 0,
    })?;
    if count < config.min_inliers.max(MIN_POINTS) {
        return Err(HomographyError::InsufficientInliers {
            needed: config.min_inliers,
            found: count,
        });
    }

    let inlier_pairs: Vec<Correspondence> = pairs
        .iter()
        .zip(&mask)
        .filter(|(_, &m)| m)
        .map(|(c, _)| *c)
        .collect();
    let refit = Homography::from_correspondences(&inlier_pairs)
        .ok()
        .filter(|h| !h.is_degenerate())
        .unwrap_or(model);

    let inliers = inliers_of(&refit);
    let inlier_count = inliers.iter().filter(|&&m| m).count();
    Ok(RansacFit {
        homography: refit,
        inliers,
        inlier_count,
    })
}
