//! Test utilities for sdtrainer crates.

use std::path::{Path, PathBuf};

/// Write a solid-color PNG of the given size. Different `seed` values give different bytes.
pub fn write_png(path: impl AsRef<Path>, width: u32, height: u32, seed: u8) -> PathBuf {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create image dir");
    }
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([seed, 255 - seed, seed / 2]));
    img.save_with_format(path, image::ImageFormat::Png)
        .expect("Failed to write png");
    path.to_path_buf()
}

/// Write an executable shell script standing in for a Python CLI script.
///
/// The runner invokes `<python> -u <script> args...`. Tests point `python` at
/// `/bin/sh`, where `-u` means "error on unset variables", so scripts must not
/// read variables they did not set.
#[cfg(unix)]
pub fn write_script(dir: impl AsRef<Path>, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.as_ref().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
    let mut perms = std::fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("Failed to chmod script");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_png_is_decodable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path().join("a").join("x.png"), 8, 4, 10);
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (8, 4));
    }

    #[test]
    fn test_write_png_seed_changes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path().join("a.png"), 4, 4, 1);
        let b = write_png(dir.path().join("b.png"), 4, 4, 2);
        assert_ne!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
    }
}
