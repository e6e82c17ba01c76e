//! Trained models, their previews, and saved training configurations.

use crate::error::{ProjectError, ProjectResult};
use crate::layout::ProjectLayout;
use crate::meta::{merge_objects, ProjectMeta, SaveModel, SaveModelPreview, TrainConfig};
use sdtrainer_common_core::random_string;
use sdtrainer_common_fs::{copy_file, file_name_string, remove_file_if_exists};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

/// Preset assigned to the generated default training configuration.
pub const DEFAULT_PRESET: &str = "default";
/// Base model of the generated default training configuration.
pub const DEFAULT_PRETRAINED_MODEL: &str = "runwayml/stable-diffusion-v1-5";

/// A trained model with absolute preview paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoraModel {
    /// File name without extension.
    pub name: String,
    pub file_name: String,
    pub path: String,
    #[serde(default)]
    pub preview: Vec<LoraPreview>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoraPreview {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_image: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<Value>,
    /// Base model the preview was generated with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

fn stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

/// Present stored models with previews resolved under `image/`.
pub fn model_views(layout: &ProjectLayout, models: &[SaveModel]) -> Vec<LoraModel> {
    models
        .iter()
        .map(|model| LoraModel {
            name: stem(&model.name),
            file_name: model.name.clone(),
            path: model.path.clone(),
            preview: model
                .previews
                .iter()
                .map(|p| LoraPreview {
                    out_image: p.img_path.as_ref().map(|img| layout.image_dir().join(img)),
                    model_name: p
                        .props
                        .as_ref()
                        .and_then(|props| props.get("sdmodel"))
                        .and_then(Value::as_str)
                        .map(|sdmodel| file_name_string(sdmodel)),
                    props: p.props.clone(),
                })
                .collect(),
        })
        .collect()
}

/// Record a model file written by a training run, replacing an entry with the same path.
pub fn record_model(meta: &mut ProjectMeta, save_path: &str) -> LoraModel {
    let file_name = file_name_string(save_path);
    meta.models.retain(|m| m.path != save_path);
    meta.models.push(SaveModel {
        path: save_path.to_string(),
        name: file_name.clone(),
        previews: Vec::new(),
    });
    info!(path = %save_path, "recorded trained model");
    LoraModel {
        name: stem(&file_name),
        file_name,
        path: save_path.to_string(),
        preview: Vec::new(),
    }
}

/// Attach a generated preview image to the model at `model_path`.
///
/// Returns the updated model, or `None` when no model has that path.
pub fn link_preview(
    meta: &mut ProjectMeta,
    image_path: &Path,
    model_path: &str,
    props: Option<Value>,
) -> Option<SaveModel> {
    let model = meta.models.iter_mut().find(|m| m.path == model_path)?;
    model.previews.push(SaveModelPreview {
        img_path: Some(file_name_string(image_path)),
        props,
    });
    Some(model.clone())
}

/// Forget the model at `model_path` and delete its file.
pub fn delete_model(meta: &mut ProjectMeta, model_path: &str) -> ProjectResult<()> {
    meta.models.retain(|m| m.path != model_path);
    remove_file_if_exists(model_path)?;
    Ok(())
}

/// Copy a model file into `dest_dir`. Returns the written path.
pub fn export_model(src: &Path, dest_dir: &Path) -> ProjectResult<PathBuf> {
    if !src.is_file() {
        return Err(ProjectError::SourceNotFound {
            path: src.to_path_buf(),
        });
    }
    let dest = dest_dir.join(file_name_string(src));
    copy_file(src, &dest)?;
    Ok(dest)
}

/// Add the default training configuration when the project has none.
pub fn ensure_default_train_config(meta: &mut ProjectMeta) -> bool {
    if !meta.train_configs.is_empty() {
        return false;
    }
    let id = random_string(6);
    meta.train_configs.push(TrainConfig {
        name: Some(id.clone()),
        id: Some(id),
        lora_preset_name: Some(DEFAULT_PRESET.to_string()),
        pretrained_model_name_or_path: Some(DEFAULT_PRETRAINED_MODEL.to_string()),
        ..Default::default()
    });
    true
}

/// Insert `config`, or shallow-merge it into the configuration with the same id.
pub fn save_train_config(meta: &mut ProjectMeta, config: TrainConfig) -> ProjectResult<()> {
    let existing = meta
        .train_configs
        .iter()
        .position(|c| c.id.is_some() && c.id == config.id);
    match existing {
        None => meta.train_configs.push(config),
        Some(index) => {
            let old = &mut meta.train_configs[index];
            let mut merged = to_object(old)?;
            merge_objects(&mut merged, to_object(&config)?);
            *old = serde_json::from_value(Value::Object(merged))
                .map_err(sdtrainer_common_core::Error::from)?;
        }
    }
    Ok(())
}

/// Remove the configuration with `id`.
pub fn delete_train_config(meta: &mut ProjectMeta, id: &str) {
    meta.train_configs.retain(|c| c.id.as_deref() != Some(id));
}

fn to_object(config: &TrainConfig) -> ProjectResult<serde_json::Map<String, Value>> {
    match serde_json::to_value(config).map_err(sdtrainer_common_core::Error::from)? {
        Value::Object(map) => Ok(map),
        _ => Ok(serde_json::Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_replaces_same_path() {
        let mut meta = ProjectMeta::default();
        record_model(&mut meta, "/out/model.safetensors");
        link_preview(&mut meta, Path::new("/img/a.png"), "/out/model.safetensors", None).unwrap();
        let model = record_model(&mut meta, "/out/model.safetensors");
        assert_eq!(meta.models.len(), 1);
        assert!(meta.models[0].previews.is_empty());
        assert_eq!(model.name, "model");
        assert_eq!(model.file_name, "model.safetensors");
    }

    #[test]
    fn test_link_preview_and_views() {
        let mut meta = ProjectMeta::default();
        record_model(&mut meta, "/out/m.safetensors");
        let props = json!({"sdmodel": "/models/sd15.ckpt", "prompt": "1girl"});
        let updated = link_preview(&mut meta, Path::new("/x/00001.png"), "/out/m.safetensors", Some(props)).unwrap();
        assert_eq!(updated.previews[0].img_path.as_deref(), Some("00001.png"));
        assert!(link_preview(&mut meta, Path::new("/x/a.png"), "/missing", None).is_none());

        let layout = ProjectLayout::new("/p");
        let views = model_views(&layout, &meta.models);
        assert_eq!(views[0].preview[0].out_image, Some(PathBuf::from("/p/image/00001.png")));
        assert_eq!(views[0].preview[0].model_name.as_deref(), Some("sd15.ckpt"));
    }

    #[test]
    fn test_delete_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("m.safetensors");
        std::fs::write(&model, b"weights").unwrap();
        let model_str = model.display().to_string();

        let exported = export_model(&model, &dir.path().join("export")).unwrap();
        assert_eq!(std::fs::read(&exported).unwrap(), b"weights");

        let mut meta = ProjectMeta::default();
        record_model(&mut meta, &model_str);
        delete_model(&mut meta, &model_str).unwrap();
        assert!(meta.models.is_empty());
        assert!(!model.exists());
        assert!(matches!(
            export_model(&model, dir.path()),
            Err(ProjectError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn test_default_train_config_only_once() {
        let mut meta = ProjectMeta::default();
        assert!(ensure_default_train_config(&mut meta));
        assert!(!ensure_default_train_config(&mut meta));
        let config = &meta.train_configs[0];
        assert_eq!(config.id.as_ref().unwrap().len(), 6);
        assert_eq!(config.id, config.name);
        assert_eq!(config.lora_preset_name.as_deref(), Some("default"));
        assert!(config.extra_params.is_empty());
    }

    #[test]
    fn test_save_train_config_merges_by_id() {
        let mut meta = ProjectMeta::default();
        let mut first: TrainConfig = serde_json::from_value(json!({
            "id": "a", "name": "first", "modelName": "base", "network_dim": 32
        }))
        .unwrap();
        save_train_config(&mut meta, first.clone()).unwrap();

        first = serde_json::from_value(json!({"id": "a", "name": "renamed", "network_alpha": 16})).unwrap();
        save_train_config(&mut meta, first).unwrap();
        save_train_config(&mut meta, serde_json::from_value(json!({"id": "b"})).unwrap()).unwrap();

        assert_eq!(meta.train_configs.len(), 2);
        let merged = serde_json::to_value(&meta.train_configs[0]).unwrap();
        assert_eq!(merged["name"], "renamed");
        assert_eq!(merged["modelName"], "base");
        assert_eq!(merged["network_dim"], 32);
        assert_eq!(merged["network_alpha"], 16);

        delete_train_config(&mut meta, "a");
        assert_eq!(meta.train_configs[0].id.as_deref(), Some("b"));
    }
}
