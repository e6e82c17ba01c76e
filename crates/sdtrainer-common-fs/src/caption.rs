//! Sidecar caption files.
//!
//! Each image `foo.png` may have a `foo.txt` next to it holding comma separated tags.

use crate::remove_file_if_exists;
use sdtrainer_common_core::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Path of the caption file belonging to `image`.
pub fn caption_path(image: impl AsRef<Path>) -> PathBuf {
    image.as_ref().with_extension("txt")
}

/// Read the tags of `image`. A missing caption file yields no tags.
pub fn read_caption(image: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = caption_path(image);
    match fs::read_to_string(&path) {
        Ok(raw) => Ok(parse_tags(&raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::fs(format!("failed to read caption: {}", path.display()), &path, e)),
    }
}

/// Write `tags` as the caption of `image`.
pub fn write_caption(image: impl AsRef<Path>, tags: &[String]) -> Result<PathBuf> {
    let path = caption_path(image);
    fs::write(&path, tags.join(","))
        .map_err(|e| Error::fs(format!("failed to write caption: {}", path.display()), &path, e))?;
    Ok(path)
}

/// Delete an image together with its caption file.
pub fn remove_with_caption(image: impl AsRef<Path>) -> Result<()> {
    let image = image.as_ref();
    remove_file_if_exists(image)?;
    remove_file_if_exists(caption_path(image))
}

fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
