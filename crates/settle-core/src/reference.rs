//! On-disk reference images.
//!
//! References are PNG files named after the screen state they show
//! (`new moon.png`, `settings-header.png`). They are only written by an
//! explicit capture; matching never modifies them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage};
use tracing::info;

use crate::driver::MobileDriver;
use crate::element::ElementHandle;
use crate::error::MatchError;
use crate::visual::{capture_element, decode, encode_png};

const EXTENSION: &str = "png";

/// A directory of named reference images.
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    root: PathBuf,
}

impl ReferenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file backing `name`. A trailing `.png` in `name` is accepted.
    ///
    /// Names must be plain file stems: empty names, path separators and
    /// `..` are rejected with [`MatchError::InvalidName`].
    pub fn path_for(&self, name: &str) -> Result<PathBuf, MatchError> {
        let stem = name.strip_suffix(".png").unwrap_or(name).trim();
        if stem.is_empty() || stem.contains(['/', '\\']) || stem.contains("..") {
            return Err(MatchError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{stem}.{EXTENSION}")))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Loads a reference as 8-bit luma.
    pub fn load(&self, name: &str) -> Result<GrayImage, MatchError> {
        let path = self.path_for(name)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MatchError::ReferenceMissing { path });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(decode(&bytes)?.to_luma8())
    }

    /// Writes `image` under `name`, creating the directory if needed.
    /// Overwrites an existing reference.
    pub fn save(&self, name: &str, image: &DynamicImage) -> Result<PathBuf, MatchError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.root)?;
        fs::write(&path, encode_png(image)?)?;
        info!(path = %path.display(), width = image.width(), height = image.height(), "saved reference image");
        Ok(path)
    }

    /// Captures the element's on-screen region and stores it as `name`.
    pub async fn capture(
        &self,
        driver: &dyn MobileDriver,
        element: &ElementHandle,
        name: &str,
    ) -> Result<PathBuf, MatchError> {
        // Validate before touching the device.
        self.path_for(name)?;
        let image = capture_element(driver, element).await?;
        self.save(name, &image)
    }

    /// Names of all stored references, sorted. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<String>, MatchError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
