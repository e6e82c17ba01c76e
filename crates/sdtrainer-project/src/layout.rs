//! On-disk layout of a project directory.

use crate::error::ProjectResult;
use sdtrainer_common_fs::ensure_dir;
use std::path::{Path, PathBuf};

/// File name of the metadata document.
pub const META_FILE: &str = "project.json";

/// Paths of a project rooted at a directory.
///
/// ```text
/// <root>/project.json
/// <root>/original/     imported source images
/// <root>/preprocess/   derived training images and captions
/// <root>/dataset/      materialized <step>_<name> folders
/// <root>/model_out/    training output
/// <root>/image/        thumbnails and preview images
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta_file(&self) -> PathBuf {
        self.root.join(META_FILE)
    }

    pub fn original_dir(&self) -> PathBuf {
        self.root.join("original")
    }

    pub fn preprocess_dir(&self) -> PathBuf {
        self.root.join("preprocess")
    }

    pub fn dataset_dir(&self) -> PathBuf {
        self.root.join("dataset")
    }

    pub fn model_out_dir(&self) -> PathBuf {
        self.root.join("model_out")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.root.join("image")
    }

    /// Whether `project.json` exists.
    pub fn exists(&self) -> bool {
        self.meta_file().is_file()
    }

    /// Create every working directory.
    pub fn ensure_dirs(&self) -> ProjectResult<()> {
        for dir in [
            self.original_dir(),
            self.preprocess_dir(),
            self.dataset_dir(),
            self.model_out_dir(),
            self.image_dir(),
        ] {
            ensure_dir(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = ProjectLayout::new("/p");
        assert_eq!(layout.meta_file(), PathBuf::from("/p/project.json"));
        assert_eq!(layout.preprocess_dir(), PathBuf::from("/p/preprocess"));
        assert_eq!(layout.image_dir(), PathBuf::from("/p/image"));
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        layout.ensure_dirs().unwrap();
        assert!(layout.original_dir().is_dir());
        assert!(layout.model_out_dir().is_dir());
        assert!(!layout.exists());
    }
}
