/// Radial zone scoring
///
/// A hit is scored in canonical-image coordinates: points outside the image
/// or outside the active zone of the mask score 0, everything else is mapped
/// through the target's ring table by distance from the image centre.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::ProfileError;

/// Mask value marking the scoreable region.
pub const ACTIVE_ZONE: u8 = 255;

/// Outer edge of one scoring ring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    /// Points strictly closer than this score `score`
    pub radius: f64,
    pub score: u8,
}

/// Ring thresholds, innermost first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Ring>", into = "Vec<Ring>")]
pub struct RingTable(Vec<Ring>);

impl RingTable {
    /// Radii must grow outward and scores must not.
    pub fn new(rings: Vec<Ring>) -> Result<Self, ProfileError> {
        if rings.is_empty() {
            return Err(ProfileError::InvalidRings("no rings".into()));
        }
        if let Some(ring) = rings.iter().find(|r| !(r.radius.is_finite() && r.radius > 0.0)) {
            return Err(ProfileError::InvalidRings(format!(
                "radius {} is not a positive number",
                ring.radius
            )));
        }
        for pair in rings.windows(2) {
            if pair[1].radius <= pair[0].radius {
                return Err(ProfileError::InvalidRings(format!(
                    "radii must increase outward ({} then {})",
                    pair[0].radius, pair[1].radius
                )));
            }
            if pair[1].score > pair[0].score {
                return Err(ProfileError::InvalidRings(format!(
                    "scores must not increase outward ({} then {})",
                    pair[0].score, pair[1].score
                )));
            }
        }
        Ok(Self(rings))
    }

    /// The 10-to-5 table of the standard target face.
    pub fn standard() -> Self {
        let rings = [(56.0, 10), (116.0, 9), (173.0, 8), (230.0, 7), (285.0, 6), (320.0, 5)]
            .into_iter()
            .map(|(radius, score)| Ring { radius, score })
            .collect();
        Self(rings)
    }

    pub fn rings(&self) -> &[Ring] {
        &self.0
    }

    pub fn score_at(&self, distance: f64) -> u8 {
        self.0
            .iter()
            .find(|ring| distance < ring.radius)
            .map_or(0, |ring| ring.score)
    }
}

impl TryFrom<Vec<Ring>> for RingTable {
    type Error = ProfileError;

    fn try_from(rings: Vec<Ring>) -> Result<Self, Self::Error> {
        Self::new(rings)
    }
}

impl From<RingTable> for Vec<Ring> {
    fn from(table: RingTable) -> Self {
        table.0
    }
}

/// Score a point given in canonical-image coordinates.
///
/// `canonical` is the canonical image size; `mask` must have the same size.
pub fn score(point: [f64; 2], canonical: (u32, u32), mask: &GrayImage, rings: &RingTable) -> u8 {
    if !(point[0].is_finite() && point[1].is_finite()) {
        return 0;
    }
    let (x, y) = (point[0].floor() as i64, point[1].floor() as i64);
    let (w, h) = (canonical.0 as i64, canonical.1 as i64);
    if x < 0 || y < 0 || x >= w || y >= h {
        return 0;
    }

    match mask.get_pixel_checked(x as u32, y as u32) {
        Some(zone) if zone[0] == ACTIVE_ZONE => {}
        _ => return 0,
    }

    let (cx, cy) = (w / 2, h / 2);
    let distance = (((x - cx).pow(2) + (y - cy).pow(2)) as f64).sqrt();
    rings.score_at(distance)
}
