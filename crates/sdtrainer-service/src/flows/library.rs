//! Model folders, recent projects, settings, and logs.

use crate::context::AppContext;
use crate::error::ServiceResult;
use sdtrainer_common_config::TrainerSettings;
use sdtrainer_common_log::export_log;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Checkpoint formats listed from model folders.
pub const MODEL_EXTENSIONS: &[&str] = &["ckpt", "safetensors"];

/// A checkpoint (or diffusers folder) on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFile {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentProject {
    pub path: String,
    pub name: String,
}

impl RecentProject {
    pub fn from_path(path: &str) -> Self {
        Self {
            path: path.to_string(),
            name: sdtrainer_common_fs::file_name_string(path),
        }
    }
}

fn has_model_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MODEL_EXTENSIONS.iter().any(|m| e.eq_ignore_ascii_case(m)))
        .unwrap_or(false)
}

/// Entries of `dir` accepted by `keep`, sorted by name. A missing folder lists nothing.
fn list_models(dir: &Path, keep: impl Fn(&Path) -> bool) -> ServiceResult<Vec<ModelFile>> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "model folder missing");
        return Ok(Vec::new());
    }
    let mut models: Vec<ModelFile> = std::fs::read_dir(dir)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| keep(path))
        .map(|path| ModelFile {
            name: sdtrainer_common_fs::file_name_string(&path),
            path,
        })
        .collect();
    models.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(models)
}

impl AppContext {
    /// Folder scanned for Stable Diffusion checkpoints: the configured one, else the default.
    pub fn stable_diffusion_models_dir(&self) -> ServiceResult<PathBuf> {
        Ok(self
            .trainer_settings()?
            .sdw_model_path
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.paths().stable_diffusion_models_dir()))
    }

    /// `.ckpt` and `.safetensors` files usable as base models for previews.
    pub fn stable_diffusion_models(&self) -> ServiceResult<Vec<ModelFile>> {
        let dir = self.stable_diffusion_models_dir()?;
        list_models(&dir, |p| p.is_file() && has_model_extension(p))
    }

    /// Pretrained base models: checkpoint files and diffusers folders.
    pub fn pretrained_models(&self) -> ServiceResult<Vec<ModelFile>> {
        list_models(&self.paths().pretrain_models_dir(), |p| {
            p.is_dir() || (p.is_file() && has_model_extension(p))
        })
    }

    pub fn recent_projects(&self) -> ServiceResult<Vec<RecentProject>> {
        Ok(self
            .settings()
            .recent_projects()?
            .iter()
            .map(|p| RecentProject::from_path(p))
            .collect())
    }

    pub fn read_config(&self, key: &str) -> Option<Value> {
        self.settings().get_raw(key)
    }

    pub fn save_config(&self, key: &str, value: Value) -> ServiceResult<()> {
        Ok(self.settings().set_raw(key, value)?)
    }

    pub fn save_trainer_settings(&self, settings: &TrainerSettings) -> ServiceResult<()> {
        Ok(self.settings().save_trainer_settings(settings)?)
    }

    /// Copy the application log into `dest_dir`. Returns the written file.
    pub fn export_log(&self, dest_dir: &Path) -> ServiceResult<PathBuf> {
        Ok(export_log(self.paths().log_file(), dest_dir)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdtrainer_common_config::AppPaths;

    #[test]
    fn test_model_lists() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::new(AppPaths::new(dir.path().join("data"))).unwrap();
        assert!(ctx.pretrained_models().unwrap().is_empty());

        let sd = dir.path().join("sd");
        std::fs::create_dir_all(sd.join("folder.ckpt")).unwrap();
        std::fs::write(sd.join("b.safetensors"), b"x").unwrap();
        std::fs::write(sd.join("a.CKPT"), b"x").unwrap();
        std::fs::write(sd.join("notes.txt"), b"x").unwrap();
        ctx.save_trainer_settings(&TrainerSettings {
            sdw_model_path: Some(sd.display().to_string()),
            ..Default::default()
        })
        .unwrap();
        let names: Vec<String> = ctx.stable_diffusion_models().unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["a.CKPT", "b.safetensors"]);

        let pretrain = ctx.paths().pretrain_models_dir();
        std::fs::create_dir_all(pretrain.join("sd-v1-5")).unwrap();
        std::fs::write(pretrain.join("anything.safetensors"), b"x").unwrap();
        std::fs::write(pretrain.join("readme.md"), b"x").unwrap();
        let names: Vec<String> = ctx.pretrained_models().unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["anything.safetensors", "sd-v1-5"]);
    }

    #[test]
    fn test_recent_projects_and_raw_config() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::new(AppPaths::new(dir.path().join("data"))).unwrap();
        ctx.settings().add_recent_project("/work/alpha").unwrap();
        ctx.settings().add_recent_project("/work/beta").unwrap();
        let recent = ctx.recent_projects().unwrap();
        assert_eq!(recent[0], RecentProject { path: "/work/beta".into(), name: "beta".into() });

        ctx.save_config("theme", serde_json::json!("dark")).unwrap();
        assert_eq!(ctx.read_config("theme"), Some(serde_json::json!("dark")));
        assert_eq!(ctx.read_config("missing"), None);
    }
}
