//! Application directory layout.

use crate::env::{vars, Environment};
use std::path::{Path, PathBuf};

/// Well-known locations under the application data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    /// Paths rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Resolve from `SDTRAINER_DATA_DIR`, falling back to the platform data directory.
    pub fn from_env() -> Self {
        if let Some(dir) = Environment::get(vars::SDTRAINER_DATA_DIR) {
            return Self::new(dir);
        }
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join("sdtrainer"))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The flat key-value settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join("sdtrainer.log")
    }

    /// Bundled pretrained base models.
    pub fn pretrain_models_dir(&self) -> PathBuf {
        self.data_dir.join("pretrain_models")
    }

    /// Default folder scanned for Stable Diffusion checkpoints.
    pub fn stable_diffusion_models_dir(&self) -> PathBuf {
        self.data_dir.join("stable-diffusion-models")
    }

    /// Default parent folder for the trainer script repository.
    pub fn default_install_dir(&self) -> PathBuf {
        self.data_dir.join("repos")
    }

    /// Directories that must exist before the application runs.
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.data_dir.clone(),
            self.log_dir(),
            self.stable_diffusion_models_dir(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = AppPaths::new("/data/sdtrainer");
        assert_eq!(paths.settings_file(), PathBuf::from("/data/sdtrainer/settings.json"));
        assert_eq!(paths.log_file(), PathBuf::from("/data/sdtrainer/logs/sdtrainer.log"));
        assert_eq!(
            paths.stable_diffusion_models_dir(),
            PathBuf::from("/data/sdtrainer/stable-diffusion-models")
        );
        assert_eq!(paths.required_dirs().len(), 3);
    }
}
