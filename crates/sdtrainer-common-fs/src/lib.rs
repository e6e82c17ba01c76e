//! File system utilities for sdtrainer.

pub mod caption;
pub mod hash;
pub mod scan;

pub use caption::{caption_path, read_caption, remove_with_caption, write_caption};
pub use hash::{hash_bytes, hash_file};
pub use scan::{is_image_file, scan_image_files, ImageFile, IMAGE_EXTENSIONS};

use sdtrainer_common_core::{Error, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Read a file to bytes.
pub fn read_bytes(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|e| Error::fs(format!("failed to read file: {}", path.display()), path, e))
}

/// Write to a file atomically (write to temp, then rename).
pub fn write_atomic(path: impl AsRef<Path>, contents: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or(Path::new("."));

    ensure_dir(parent)?;

    // Temporary file lives next to the target so rename stays on one filesystem
    let mut temp_path = path.to_path_buf();
    if let Some(name) = path.file_name() {
        temp_path.set_file_name(format!(".{}.tmp", name.to_string_lossy()));
    } else {
        temp_path.push(".tmp");
    }

    {
        let mut file = File::create(&temp_path).map_err(|e| {
            Error::fs(
                format!("failed to create temporary file: {}", temp_path.display()),
                &temp_path,
                e,
            )
        })?;

        file.write_all(contents).map_err(|e| {
            Error::fs(
                format!("failed to write to temporary file: {}", temp_path.display()),
                &temp_path,
                e,
            )
        })?;

        file.sync_all().map_err(|e| {
            Error::fs(
                format!("failed to sync temporary file: {}", temp_path.display()),
                &temp_path,
                e,
            )
        })?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::fs(
            format!("failed to rename temporary file to target: {}", path.display()),
            path,
            e,
        )
    })?;

    Ok(())
}

/// Write string to file atomically.
pub fn write_string_atomic(path: impl AsRef<Path>, contents: &str) -> Result<()> {
    write_atomic(path, contents.as_bytes())
}

/// Ensure a directory exists.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            Error::fs(format!("failed to create directory: {}", path.display()), path, e)
        })?;
    }
    Ok(())
}

/// Remove a directory tree if it exists.
pub fn remove_dir_all_if_exists(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::fs(
            format!("failed to remove directory: {}", path.display()),
            path,
            e,
        )),
    }
}

/// Remove a file, treating "already gone" as success.
pub fn remove_file_if_exists(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::fs(format!("failed to remove file: {}", path.display()), path, e)),
    }
}

/// Copy `from` to `to`, creating the destination directory.
pub fn copy_file(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
    let (from, to) = (from.as_ref(), to.as_ref());
    if let Some(parent) = to.parent() {
        ensure_dir(parent)?;
    }
    fs::copy(from, to).map_err(|e| {
        Error::fs(
            format!("failed to copy {} to {}", from.display(), to.display()),
            from,
            e,
        )
    })?;
    Ok(())
}

/// File name of `path` as a UTF-8 string (lossy).
pub fn file_name_string(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
