//! Thumbnails and in-memory image conversion.

use crate::error::{ProjectError, ProjectResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// Width of generated thumbnails.
pub const THUMBNAIL_WIDTH: u32 = 120;

/// Prefix accepted by [`decode_png_data_url`].
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Prefix of thumbnail file names inside `image/`.
pub const THUMBNAIL_PREFIX: &str = "tnb_";

/// Write a thumbnail of `source` to `dest`, scaled to [`THUMBNAIL_WIDTH`] keeping the aspect ratio.
pub fn make_thumbnail(source: &Path, dest: &Path) -> ProjectResult<()> {
    let img = image::open(source).map_err(|e| ProjectError::image(source, e))?;
    let thumb = img.resize(THUMBNAIL_WIDTH, u32::MAX, FilterType::Triangle);
    save_image(&thumb, dest)
}

/// Decode a `data:image/png;base64,` URL.
pub fn decode_png_data_url(data_url: &str) -> ProjectResult<DynamicImage> {
    let raw = data_url
        .strip_prefix(PNG_DATA_URL_PREFIX)
        .ok_or_else(|| ProjectError::InvalidDataUrl {
            message: "expected a data:image/png;base64 URL".to_string(),
        })?;
    let bytes = STANDARD
        .decode(raw.trim())
        .map_err(|e| ProjectError::InvalidDataUrl {
            message: e.to_string(),
        })?;
    image::load_from_memory_with_format(&bytes, ImageFormat::Png).map_err(|e| {
        ProjectError::InvalidDataUrl {
            message: e.to_string(),
        }
    })
}

/// Resize to exactly `width` x `height` and save as PNG.
pub fn save_resized_png(img: &DynamicImage, width: u32, height: u32, dest: &Path) -> ProjectResult<()> {
    let resized = img.resize_exact(width, height, FilterType::Lanczos3);
    resized
        .save_with_format(dest, ImageFormat::Png)
        .map_err(|e| ProjectError::image(dest, e))
}

/// Save using the format implied by the extension of `dest`.
fn save_image(img: &DynamicImage, dest: &Path) -> ProjectResult<()> {
    let format = ImageFormat::from_path(dest).map_err(|e| ProjectError::image(dest, e))?;
    let result = match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()).save_with_format(dest, format),
        _ => img.save_with_format(dest, format),
    };
    result.map_err(|e| ProjectError::image(dest, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdtrainer_test_utils::write_png;
    use std::io::Cursor;

    #[test]
    fn test_thumbnail_keeps_aspect() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_png(dir.path().join("a.png"), 240, 480, 3);
        let dest = dir.path().join("tnb_a.png");
        make_thumbnail(&src, &dest).unwrap();
        let thumb = image::open(&dest).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (120, 240));
    }

    #[test]
    fn test_thumbnail_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_png(dir.path().join("a.png"), 60, 60, 3);
        let dest = dir.path().join("tnb_a.jpg");
        make_thumbnail(&src, &dest).unwrap();
        assert_eq!(image::open(&dest).unwrap().width(), 120);
    }

    #[test]
    fn test_thumbnail_of_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.png");
        std::fs::write(&src, b"not an image").unwrap();
        assert!(matches!(
            make_thumbnail(&src, &dir.path().join("t.png")),
            Err(ProjectError::Image { .. })
        ));
    }

    #[test]
    fn test_decode_data_url() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(4, 2));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        let url = format!("{PNG_DATA_URL_PREFIX}{}", STANDARD.encode(&bytes));
        let decoded = decode_png_data_url(&url).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 2));
    }

    #[test]
    fn test_decode_rejects_other_prefixes() {
        for url in ["data:image/jpeg;base64,AAAA", "AAAA", "data:image/png;base64,!!!"] {
            assert!(matches!(
                decode_png_data_url(url),
                Err(ProjectError::InvalidDataUrl { .. })
            ));
        }
    }
}
