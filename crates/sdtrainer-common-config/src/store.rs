//! Flat persistent key-value settings store.

use crate::presets::{builtin_presets, upsert_preset};
use crate::types::{keys, LoraConfig, LoraPreset, TrainerSettings};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum number of entries kept in the recent project list.
const MAX_RECENT_PROJECTS: usize = 20;

/// Settings store errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid JSON at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("invalid value for key '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to write settings: {0}")]
    WriteError(#[from] sdtrainer_common_core::Error),
}

/// JSON-file backed key-value store.
///
/// Every mutation rewrites the whole file atomically while holding the write lock,
/// so concurrent writers in one process are serialized.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Map<String, Value>>,
}

impl SettingsStore {
    /// Open the store at `path`. A missing file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&contents) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) => {
                        return Err(ConfigError::ParseError {
                            line: None,
                            message: "settings file must contain a JSON object".to_string(),
                        })
                    }
                    Err(e) => {
                        return Err(ConfigError::ParseError {
                            line: Some(e.line()),
                            message: e.to_string(),
                        })
                    }
                }
            }
        } else {
            Map::new()
        };

        debug!(path = %path.display(), keys = data.len(), "settings store opened");
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw value under `key`.
    pub fn get_raw(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Store a raw value under `key`.
    pub fn set_raw(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        self.update(|data| {
            data.insert(key.to_string(), value);
        })
    }

    /// Remove `key`, returning its previous value.
    pub fn remove(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        let mut removed = None;
        self.update(|data| removed = data.remove(key))?;
        Ok(removed)
    }

    /// Typed value under `key`; `None` when unset or null.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get_raw(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// Store a typed value under `key`.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ConfigError> {
        let value = serde_json::to_value(value).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.set_raw(key, value)
    }

    /// Apply `f` to the whole map and persist the result.
    pub fn update<F>(&self, f: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let mut data = self.data.write();
        f(&mut data);
        let serialized = serde_json::to_string_pretty(&*data).map_err(|e| ConfigError::ParseError {
            line: None,
            message: e.to_string(),
        })?;
        sdtrainer_common_fs::write_string_atomic(&self.path, &serialized)?;
        Ok(())
    }

    pub fn trainer_settings(&self) -> Result<TrainerSettings, ConfigError> {
        Ok(self.get(keys::TRAINER_SETTING)?.unwrap_or_default())
    }

    pub fn save_trainer_settings(&self, settings: &TrainerSettings) -> Result<(), ConfigError> {
        self.set(keys::TRAINER_SETTING, settings)
    }

    pub fn lora_config(&self) -> Result<LoraConfig, ConfigError> {
        Ok(self.get(keys::TRAINING_CONFIG)?.unwrap_or_default())
    }

    pub fn save_lora_config(&self, config: &LoraConfig) -> Result<(), ConfigError> {
        self.set(keys::TRAINING_CONFIG, config)
    }

    /// User presets only.
    pub fn stored_presets(&self) -> Result<Vec<LoraPreset>, ConfigError> {
        Ok(self.get(keys::LORA_PRESET)?.unwrap_or_default())
    }

    /// Built-in presets followed by user presets.
    pub fn presets(&self) -> Result<Vec<LoraPreset>, ConfigError> {
        let mut presets = builtin_presets();
        presets.extend(self.stored_presets()?);
        Ok(presets)
    }

    /// Find a preset by name, searching built-ins first.
    pub fn preset(&self, name: &str) -> Result<Option<LoraPreset>, ConfigError> {
        Ok(self.presets()?.into_iter().find(|p| p.name == name))
    }

    /// Add a user preset, merging params into an existing preset of the same name.
    pub fn add_preset(&self, preset: LoraPreset) -> Result<(), ConfigError> {
        let mut stored = self.stored_presets()?;
        upsert_preset(&mut stored, preset);
        self.set(keys::LORA_PRESET, &stored)
    }

    pub fn remove_preset(&self, name: &str) -> Result<(), ConfigError> {
        let mut stored = self.stored_presets()?;
        stored.retain(|p| p.name != name);
        self.set(keys::LORA_PRESET, &stored)
    }

    /// Recently opened project directories, most recent first.
    pub fn recent_projects(&self) -> Result<Vec<String>, ConfigError> {
        match self.get::<Vec<String>>(keys::RECENT_PROJECTS) {
            Ok(list) => Ok(list.unwrap_or_default()),
            Err(e) => {
                warn!(error = %e, "ignoring malformed recent project list");
                Ok(Vec::new())
            }
        }
    }

    /// Move `path` to the front of the recent project list.
    pub fn add_recent_project(&self, path: &str) -> Result<Vec<String>, ConfigError> {
        let mut recent = self.recent_projects()?;
        recent.retain(|p| p != path);
        recent.insert(0, path.to_string());
        recent.truncate(MAX_RECENT_PROJECTS);
        self.set(keys::RECENT_PROJECTS, &recent)?;
        Ok(recent)
    }
}
