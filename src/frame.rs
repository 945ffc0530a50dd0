use chrono::{DateTime, Local};
use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};

/// A single camera frame.
///
/// `Clone` is a deep copy of the pixel buffer; frames crossing a thread
/// boundary are always cloned, never shared.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Local::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Geometric centre using integer division, matching pixel addressing.
    pub fn center(&self) -> AimPoint {
        AimPoint::new((self.width() / 2) as i32, (self.height() / 2) as i32)
    }

    /// Copy out the pixels bounded by `[x1, x2) × [y1, y2)`, clamped to the frame.
    ///
    /// Returns `None` when the clamped region is empty.
    pub fn crop(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> Option<(RgbImage, AimPoint)> {
        let w = self.width() as i64;
        let h = self.height() as i64;
        let left = x1.clamp(0, w);
        let top = y1.clamp(0, h);
        let right = x2.clamp(0, w);
        let bottom = y2.clamp(0, h);
        if right <= left || bottom <= top {
            return None;
        }

        let crop = imageops::crop_imm(
            &self.image,
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        )
        .to_image();
        Some((crop, AimPoint::new(left as i32, top as i32)))
    }
}

/// Integer pixel coordinate, as exchanged with the server and persisted on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AimPoint {
    pub x: i32,
    pub y: i32,
}

impl AimPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset_from(self, origin: AimPoint) -> AimPoint {
        AimPoint::new(self.x - origin.x, self.y - origin.y)
    }
}
