use image::{Rgb, RgbImage};
use rayon::prelude::*;

use super::homography::Homography;

/// Resample `src` into a `width × height` image through `h` (src → dst).
///
/// Inverse mapping with bilinear interpolation; destination pixels that map
/// outside `src` stay black. Returns `None` when `h` is not invertible.
pub fn warp_perspective(src: &RgbImage, h: &Homography, width: u32, height: u32) -> Option<RgbImage> {
    let inverse = h.inverse()?;
    let mut out = RgbImage::new(width, height);
    if width == 0 || height == 0 {
        return Some(out);
    }
    let row_size = width as usize * 3;

    out.as_flat_samples_mut()
        .samples
        .par_chunks_mut(row_size)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let Some([sx, sy]) = inverse.project(x as f64, y as f64) else {
                    continue;
                };
                if let Some(Rgb(px)) = bilinear(src, sx, sy) {
                    row[x * 3..x * 3 + 3].copy_from_slice(&px);
                }
            }
        });

    Some(out)
}

fn bilinear(img: &RgbImage, x: f64, y: f64) -> Option<Rgb<u8>> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    if x < 0.0 || y < 0.0 || x > (w - 1) as f64 || y > (h - 1) as f64 {
        return None;
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let (p00, p10) = (img.get_pixel(x0, y0), img.get_pixel(x1, y0));
    let (p01, p11) = (img.get_pixel(x0, y1), img.get_pixel(x1, y1));
    let mut out = [0u8; 3];
    for (c, value) in out.iter_mut().enumerate() {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        *value = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgb(out))
}
