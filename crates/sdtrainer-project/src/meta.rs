//! The `project.json` document.

use crate::error::{ProjectError, ProjectResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Default target width and height of preprocessed images.
pub const DEFAULT_RESOLUTION: u32 = 512;

/// Per-project metadata, stored as `project.json`.
///
/// Fields this version does not know about are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMeta {
    #[serde(default)]
    pub models: Vec<SaveModel>,
    #[serde(default)]
    pub train_configs: Vec<TrainConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_props: Option<Value>,
    #[serde(default)]
    pub preprocess: Vec<PreprocessLink>,
    #[serde(default)]
    pub dataset: Vec<DatasetFolder>,
    #[serde(default)]
    pub original: Vec<OriginalItem>,
    #[serde(default)]
    pub params: ProjectParam,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Target resolution of the preprocessing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectParam {
    pub width: u32,
    pub height: u32,
}

impl Default for ProjectParam {
    fn default() -> Self {
        Self {
            width: DEFAULT_RESOLUTION,
            height: DEFAULT_RESOLUTION,
        }
    }
}

/// An imported source image.
///
/// `src` and `thumbnail` are file names relative to `original/` and `image/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalItem {
    pub hash: String,
    pub src: String,
    pub thumbnail: String,
}

/// Links a preprocessed file (`dest`, identified by `hash`) to the original it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessLink {
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    pub dest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_history: Option<Vec<CaptionHistory>>,
}

/// A tag once suggested by a tagger for an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionHistory {
    pub tagger_id: String,
    pub name: String,
    pub rank: f64,
    pub created_at: String,
}

/// A named, repeat-weighted training folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFolder {
    pub name: String,
    pub step: u32,
    #[serde(default)]
    pub images: Vec<String>,
}

impl DatasetFolder {
    /// Directory name used when the folder is materialized.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.step, self.name)
    }
}

/// A trained LoRA model and its preview generations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveModel {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub previews: Vec<SaveModelPreview>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveModelPreview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Value>,
}

/// A saved training configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora_preset_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(
        rename = "pretrained_model_name_or_path",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pretrained_model_name_or_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(default)]
    pub extra_params: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Shallow patch of top-level metadata keys. `None` leaves a key untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectMetaPatch {
    pub models: Option<Vec<SaveModel>>,
    pub train_configs: Option<Vec<TrainConfig>>,
    pub preview_props: Option<Value>,
    pub preprocess: Option<Vec<PreprocessLink>>,
    pub dataset: Option<Vec<DatasetFolder>>,
    pub original: Option<Vec<OriginalItem>>,
    pub params: Option<ProjectParam>,
}

impl ProjectMetaPatch {
    /// Replace every key present in the patch.
    pub fn apply(self, meta: &mut ProjectMeta) {
        if let Some(models) = self.models {
            meta.models = models;
        }
        if let Some(train_configs) = self.train_configs {
            meta.train_configs = train_configs;
        }
        if let Some(preview_props) = self.preview_props {
            meta.preview_props = Some(preview_props);
        }
        if let Some(preprocess) = self.preprocess {
            meta.preprocess = preprocess;
        }
        if let Some(dataset) = self.dataset {
            meta.dataset = dataset;
        }
        if let Some(original) = self.original {
            meta.original = original;
        }
        if let Some(params) = self.params {
            meta.params = params;
        }
    }
}

/// Parse a metadata document.
pub fn parse_meta(path: &Path, raw: &str) -> ProjectResult<ProjectMeta> {
    let value: Value = serde_json::from_str(raw).map_err(|e| ProjectError::InvalidMeta {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if !value.is_object() {
        return Err(ProjectError::InvalidMeta {
            path: path.to_path_buf(),
            message: "expected a JSON object".to_string(),
        });
    }
    serde_json::from_value(value).map_err(|e| ProjectError::InvalidMeta {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Serialize `meta` as pretty JSON with two-space indentation.
pub fn to_pretty_json(meta: &ProjectMeta) -> ProjectResult<String> {
    serde_json::to_string_pretty(meta).map_err(|e| sdtrainer_common_core::Error::from(e).into())
}

/// Read `path`, writing a default document first when the file is absent.
pub fn read_or_create(path: &Path) -> ProjectResult<ProjectMeta> {
    match std::fs::read_to_string(path) {
        Ok(raw) => parse_meta(path, &raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let meta = ProjectMeta::default();
            write_meta_file(path, &meta)?;
            Ok(meta)
        }
        Err(e) => Err(sdtrainer_common_core::Error::fs(
            format!("failed to read project metadata: {}", path.display()),
            path,
            e,
        )
        .into()),
    }
}

/// Replace the whole document atomically.
pub fn write_meta_file(path: &Path, meta: &ProjectMeta) -> ProjectResult<()> {
    let json = to_pretty_json(meta)?;
    sdtrainer_common_fs::write_string_atomic(path, &json)?;
    Ok(())
}

/// Shallow-merge the keys of `patch` into `base`, the way a JSON object spread does.
pub fn merge_objects(base: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        base.insert(key, value);
    }
}
