use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::ProfileError;
use crate::registration::{Reference, RegistrationParams};
use crate::scoring::RingTable;

pub const MANIFEST_FILE: &str = "profile.json";

/// On-disk description of a target profile, `<targets_dir>/<name>/profile.json`.
///
/// Image paths are relative to the profile directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileManifest {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Label sent to the server; defaults to `name`
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_canonical")]
    pub canonical: PathBuf,
    #[serde(default = "default_mask")]
    pub mask: PathBuf,
    #[serde(default = "RingTable::standard")]
    pub rings: RingTable,
    #[serde(default)]
    pub save_training_images: bool,
}

fn default_version() -> u32 {
    1
}

fn default_canonical() -> PathBuf {
    PathBuf::from("canonical.png")
}

fn default_mask() -> PathBuf {
    PathBuf::from("mask.png")
}

/// Canonical image, zone mask and ring table of one target face.
///
/// The three only make sense together, so they are loaded and versioned as
/// one bundle.
#[derive(Debug, Clone)]
pub struct TargetProfile {
    pub name: String,
    pub version: u32,
    pub display_name: String,
    pub mask: GrayImage,
    pub rings: RingTable,
    pub save_training_images: bool,
    pub reference: Reference,
}

impl TargetProfile {
    /// Load a profile from its directory.
    pub fn load(dir: &Path, params: &RegistrationParams) -> Result<Self, ProfileError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let text = fs::read_to_string(&manifest_path).map_err(|e| ProfileError::Read {
            path: manifest_path.display().to_string(),
            source: Box::new(e),
        })?;
        let manifest: ProfileManifest =
            serde_json::from_str(&text).map_err(|e| ProfileError::Read {
                path: manifest_path.display().to_string(),
                source: Box::new(e),
            })?;

        let canonical = load_image(&dir.join(&manifest.canonical))?.to_rgb8();
        let mask = load_image(&dir.join(&manifest.mask))?.to_luma8();

        tracing::info!(
            "✓ Loaded target profile '{}' v{} ({}x{})",
            manifest.name,
            manifest.version,
            canonical.width(),
            canonical.height()
        );

        Self::from_parts(
            manifest.name.clone(),
            manifest.version,
            manifest.display_name.unwrap_or(manifest.name),
            canonical,
            mask,
            manifest.rings,
            manifest.save_training_images,
            params,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        name: String,
        version: u32,
        display_name: String,
        canonical: RgbImage,
        mask: GrayImage,
        rings: RingTable,
        save_training_images: bool,
        params: &RegistrationParams,
    ) -> Result<Self, ProfileError> {
        if mask.dimensions() != canonical.dimensions() {
            return Err(ProfileError::MaskSizeMismatch {
                mask: mask.dimensions(),
                canonical: canonical.dimensions(),
            });
        }

        Ok(Self {
            name,
            version,
            display_name,
            mask,
            rings,
            save_training_images,
            reference: Reference::new(canonical, params),
        })
    }

    pub fn canonical(&self) -> &RgbImage {
        &self.reference.image
    }

    pub fn canonical_size(&self) -> (u32, u32) {
        self.reference.image.dimensions()
    }
}

fn load_image(path: &Path) -> Result<image::DynamicImage, ProfileError> {
    image::open(path).map_err(|source| ProfileError::Image {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use tempfile::TempDir;

    fn write_profile(dir: &Path, manifest: &str, mask_size: (u32, u32)) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
        RgbImage::from_pixel(64, 48, Rgb([200, 200, 200]))
            .save(dir.join("canonical.png"))
            .unwrap();
        GrayImage::from_pixel(mask_size.0, mask_size.1, Luma([255]))
            .save(dir.join("mask.png"))
            .unwrap();
    }

    #[test]
    fn test_manifest_defaults() {
        let manifest: ProfileManifest = serde_json::from_str(r#"{"name": "bia_so_4"}"#).unwrap();

        assert_eq!(manifest.version, 1);
        assert_eq!(manifest.canonical, PathBuf::from("canonical.png"));
        assert_eq!(manifest.mask, PathBuf::from("mask.png"));
        assert_eq!(manifest.rings, RingTable::standard());
        assert!(!manifest.save_training_images);
    }

    #[test]
    fn test_manifest_rejects_bad_rings() {
        let result: Result<ProfileManifest, _> = serde_json::from_str(
            r#"{"name": "x", "rings": [{"radius": 50, "score": 9}, {"radius": 40, "score": 8}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_profile_from_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("bia_so_4");
        write_profile(
            &dir,
            r#"{"name": "bia_so_4", "version": 2, "display_name": "Target 4"}"#,
            (64, 48),
        );

        let profile = TargetProfile::load(&dir, &RegistrationParams::default()).unwrap();

        assert_eq!(profile.name, "bia_so_4");
        assert_eq!(profile.version, 2);
        assert_eq!(profile.display_name, "Target 4");
        assert_eq!(profile.canonical_size(), (64, 48));
    }

    #[test]
    fn test_mask_must_match_canonical() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("bad");
        write_profile(&dir, r#"{"name": "bad"}"#, (32, 48));

        let err = TargetProfile::load(&dir, &RegistrationParams::default()).unwrap_err();
        assert!(matches!(
            err,
            ProfileError::MaskSizeMismatch {
                mask: (32, 48),
                canonical: (64, 48)
            }
        ));
    }

    #[test]
    fn test_missing_manifest() {
        let tmp = TempDir::new().unwrap();
        let err = TargetProfile::load(tmp.path(), &RegistrationParams::default()).unwrap_err();
        assert!(matches!(err, ProfileError::Read { .. }));
    }
}
