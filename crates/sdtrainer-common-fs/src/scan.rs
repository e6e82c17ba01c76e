//! Image directory scanning.

use crate::caption::{caption_path, read_caption};
use sdtrainer_common_core::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions recognised as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// An image on disk with its caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub path: PathBuf,
    pub caption_path: PathBuf,
    pub captions: Vec<String>,
}

/// Whether `path` has an image extension.
pub fn is_image_file(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// List the images directly inside `dir`, sorted by name.
///
/// A missing directory is treated as empty.
pub fn scan_image_files(dir: impl AsRef<Path>) -> Result<Vec<ImageFile>> {
    let dir = dir.as_ref();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::fs(format!("failed to read directory: {}", dir.display()), dir, e)),
    };

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::fs(format!("failed to read directory: {}", dir.display()), dir, e))?;
        let path = entry.path();
        if !path.is_file() || !is_image_file(&path) {
            continue;
        }
        images.push(ImageFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            caption_path: caption_path(&path),
            captions: read_caption(&path)?,
            path,
        });
    }
    images.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(images)
}
