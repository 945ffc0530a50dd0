use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};

use crate::error::CaptureError;
use crate::frame::Frame;
use crate::state::calibration::MIN_ZOOM;

/// A camera-like producer of frames.
pub trait FrameSource: Send {
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Next frame, or `None` when momentarily unavailable.
    fn capture(&mut self) -> Option<Frame>;

    fn set_zoom(&mut self, zoom: f32);

    fn stop(&mut self);
}

/// Sensor window selected by the digital zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Centred sensor crop for `zoom` that keeps the stream's aspect ratio.
pub fn zoom_region(sensor: (u32, u32), stream: (u32, u32), zoom: f32) -> ZoomRegion {
    let zoom = if zoom.is_finite() { zoom.max(MIN_ZOOM) } else { MIN_ZOOM } as f64;
    let (full_w, full_h) = (sensor.0 as f64, sensor.1 as f64);
    let aspect = stream.0.max(1) as f64 / stream.1.max(1) as f64;

    let mut crop_w = full_w / zoom;
    let mut crop_h = full_h / zoom;

    let aspect_w = crop_h * aspect;
    if aspect_w <= crop_w {
        crop_w = aspect_w;
    } else {
        crop_h = crop_w / aspect;
    }

    ZoomRegion {
        x: ((full_w - crop_w) / 2.0) as u32,
        y: ((full_h - crop_h) / 2.0) as u32,
        width: (crop_w as u32).max(1),
        height: (crop_h as u32).max(1),
    }
}

/// Replays a directory of still images as a looping stream.
///
/// Each image is treated as the full sensor: the zoom window is cut out of
/// it and resized to the stream size, as the camera's scaler would.
pub struct ReplaySource {
    dir: PathBuf,
    stream_size: (u32, u32),
    files: Vec<PathBuf>,
    next: usize,
    zoom: f32,
}

impl ReplaySource {
    pub fn new(dir: impl Into<PathBuf>, stream_size: (u32, u32)) -> Self {
        Self {
            dir: dir.into(),
            stream_size,
            files: Vec::new(),
            next: 0,
            zoom: MIN_ZOOM,
        }
    }

    fn list_images(dir: &Path) -> Result<Vec<PathBuf>, CaptureError> {
        if !dir.is_dir() {
            return Err(CaptureError::SourceNotFound(dir.display().to_string()));
        }

        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(CaptureError::ReadFailed)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CaptureError::NoFrames(dir.display().to_string()));
        }
        Ok(files)
    }
}

impl FrameSource for ReplaySource {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.files = Self::list_images(&self.dir)?;
        self.next = 0;
        tracing::info!(
            "✓ Replay source ready: {} frames from {}",
            self.files.len(),
            self.dir.display()
        );
        Ok(())
    }

    fn capture(&mut self) -> Option<Frame> {
        if self.files.is_empty() {
            return None;
        }
        let path = &self.files[self.next % self.files.len()];
        self.next = (self.next + 1) % self.files.len();

        let sensor = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(err) => {
                tracing::warn!("Skipping unreadable frame {}: {err}", path.display());
                return None;
            }
        };

        let region = zoom_region(sensor.dimensions(), self.stream_size, self.zoom);
        let window = imageops::crop_imm(&sensor, region.x, region.y, region.width, region.height)
            .to_image();
        let (w, h) = self.stream_size;
        Some(Frame::new(imageops::resize(&window, w, h, FilterType::Triangle)))
    }

    fn set_zoom(&mut self, zoom: f32) {
        self.zoom = if zoom.is_finite() { zoom.max(MIN_ZOOM) } else { MIN_ZOOM };
        tracing::info!(
            "Digital zoom set to {:.1}x, keeping {}:{}",
            self.zoom,
            self.stream_size.0,
            self.stream_size.1
        );
    }

    fn stop(&mut self) {
        self.files.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_zoom_one_keeps_full_height() {
        // 4:3 landscape sensor into a 3:4 portrait stream
        let region = zoom_region((4056, 3040), (480, 640), 1.0);
        assert_eq!(region.height, 3040);
        assert_eq!(region.width, 2280);
        assert_eq!(region.x, 888);
        assert_eq!(region.y, 0);
    }

    #[test]
    fn test_zoom_keeps_aspect_and_centre() {
        let region = zoom_region((4000, 3000), (480, 640), 2.0);
        assert_eq!((region.width, region.height), (1125, 1500));
        assert_eq!((region.x, region.y), (1437, 750));
    }

    #[test]
    fn test_zoom_fits_width_when_height_is_too_tall() {
        let region = zoom_region((1000, 4000), (480, 640), 1.0);
        assert_eq!(region.width, 1000);
        assert_eq!(region.height, 1333);
    }

    #[test]
    fn test_zoom_below_one_is_clamped() {
        assert_eq!(
            zoom_region((800, 600), (480, 640), 0.25),
            zoom_region((800, 600), (480, 640), 1.0)
        );
    }

    #[test]
    fn test_replay_cycles_sorted_frames() {
        let dir = tempfile::tempdir().unwrap();
        for (i, name) in ["b.png", "a.png"].iter().enumerate() {
            RgbImage::from_pixel(30, 40, Rgb([i as u8 * 100, 0, 0]))
                .save(dir.path().join(name))
                .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ReplaySource::new(dir.path(), (15, 20));
        source.start().unwrap();

        let first = source.capture().unwrap();
        assert_eq!(first.image.dimensions(), (15, 20));
        assert_eq!(first.image.get_pixel(7, 10)[0], 100);

        let second = source.capture().unwrap();
        assert_eq!(second.image.get_pixel(7, 10)[0], 0);
        assert!(source.capture().is_some());
    }

    #[test]
    fn test_missing_or_empty_directory() {
        let mut source = ReplaySource::new("/nonexistent/frames", (480, 640));
        assert!(matches!(source.start(), Err(CaptureError::SourceNotFound(_))));

        let dir = tempfile::tempdir().unwrap();
        let mut source = ReplaySource::new(dir.path(), (480, 640));
        assert!(matches!(source.start(), Err(CaptureError::NoFrames(_))));
        assert!(source.capture().is_none());
    }
}
