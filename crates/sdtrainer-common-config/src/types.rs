//! Typed values stored in the settings file.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Keys of the well-known settings entries.
pub mod keys {
    pub const LORA_PRESET: &str = "loraPreset";
    pub const TRAINER_SETTING: &str = "trainer_setting";
    pub const TRAINING_CONFIG: &str = "training_config";
    pub const RECENT_PROJECTS: &str = "recent_projects";
}

/// User-editable trainer settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrainerSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdw_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdw_port: Option<String>,
    /// Folder scanned for Stable Diffusion checkpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdw_model_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lora_script_install_with_cn: Option<bool>,
    /// Clone the trainer scripts from the CN mirror.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lora_script_cn_repo: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_xformers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_path: Option<String>,
    /// Directory of a standalone Python install that overrides the repo venv.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trainer_python_path: Option<String>,
}

impl TrainerSettings {
    /// `http_proxy`/`https_proxy` overlay for subprocesses, empty when no proxy is set.
    pub fn proxy_env(&self) -> Vec<(String, String)> {
        match self.proxy.as_deref().filter(|p| !p.is_empty()) {
            Some(proxy) => vec![
                ("http_proxy".to_string(), proxy.to_string()),
                ("https_proxy".to_string(), proxy.to_string()),
            ],
            None => Vec::new(),
        }
    }

    /// The trainer python directory, if configured and present on disk.
    pub fn existing_trainer_python(&self) -> Option<PathBuf> {
        self.trainer_python_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .filter(|p| p.exists())
    }
}

/// Locations of the installed trainer script repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoraConfig {
    /// Repository used to launch `train_network.py`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lora_python_exec: Option<String>,
    /// Repository holding the preprocess/caption/generate scripts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocess_repo: Option<String>,
}

impl LoraConfig {
    pub fn train_repo(&self) -> Option<PathBuf> {
        non_empty_path(self.lora_python_exec.as_deref())
    }

    pub fn script_repo(&self) -> Option<PathBuf> {
        non_empty_path(self.preprocess_repo.as_deref())
    }
}

fn non_empty_path(value: Option<&str>) -> Option<PathBuf> {
    value.filter(|p| !p.is_empty()).map(PathBuf::from)
}

/// A named set of training parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoraPreset {
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub built_in: bool,
}

impl LoraPreset {
    pub fn new(name: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            params,
            built_in: false,
        }
    }
}
