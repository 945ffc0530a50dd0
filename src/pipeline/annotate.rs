use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use crate::error::EncodeError;
use crate::frame::AimPoint;

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const YELLOW: Rgb<u8> = Rgb([255, 215, 0]);

/// Cross-hair styles drawn on outgoing images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Aim point on a live or missed frame
    Aim,
    /// Impact mapped through a homography
    Registered,
    /// Impact approximated by scaling the crop; drawn in a different colour
    Scaled,
}

impl Marker {
    fn style(self) -> (i32, i32, Rgb<u8>) {
        match self {
            Marker::Aim => (30, 2, RED),
            Marker::Registered => (40, 3, RED),
            Marker::Scaled => (40, 3, YELLOW),
        }
    }
}

pub fn draw_marker(image: &mut RgbImage, at: AimPoint, marker: Marker) {
    let (size, thickness, color) = marker.style();
    draw_cross(image, at, size, thickness, color);
}

/// Draw a `+` of total length `size`, clipped to the image.
///
/// Points anywhere in the `i32` range are accepted; a cross entirely off the
/// image draws nothing.
pub fn draw_cross(image: &mut RgbImage, at: AimPoint, size: i32, thickness: i32, color: Rgb<u8>) {
    let width = image.width() as i64;
    let height = image.height() as i64;
    let half = (size / 2) as i64;
    let lo = -(thickness / 2) as i64;
    let hi = lo + thickness.max(1) as i64;
    let (cx, cy) = (at.x as i64, at.y as i64);

    let reach = half.max(hi);
    if cx + reach < 0 || cy + reach < 0 || cx - reach >= width || cy - reach >= height {
        return;
    }

    let mut put = |x: i64, y: i64| {
        if x >= 0 && y >= 0 && x < width && y < height {
            image.put_pixel(x as u32, y as u32, color);
        }
    };

    for d in -half..=half {
        for t in lo..hi {
            put(cx + d, cy + t);
            put(cx + t, cy + d);
        }
    }
}

pub fn draw_rectangle(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if width == 0 || height == 0 {
        return;
    }
    let left = left.clamp(0, width - 1);
    let right = right.clamp(0, width - 1);
    let top = top.clamp(0, height - 1);
    let bottom = bottom.clamp(0, height - 1);

    for x in left..=right {
        image.put_pixel(x as u32, top as u32, color);
        image.put_pixel(x as u32, bottom as u32, color);
    }
    for y in top..=bottom {
        image.put_pixel(left as u32, y as u32, color);
        image.put_pixel(right as u32, y as u32, color);
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(EncodeError::Jpeg)?;
    Ok(buffer)
}
