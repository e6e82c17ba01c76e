//! High level operations on an open project.

use crate::dataset::{create_dataset, references, remove_from_folders};
use crate::error::{ProjectError, ProjectResult};
use crate::layout::ProjectLayout;
use crate::meta::{
    write_meta_file, CaptionHistory, DatasetFolder, ProjectMeta, ProjectMetaPatch, ProjectParam, TrainConfig,
};
use crate::models::{self, LoraModel};
use crate::original::{self, ImportProgress, OriginalView};
use crate::preprocess::{self, PreprocessItem, PreprocessOutput};
use crate::store::ProjectStore;
use sdtrainer_common_fs::{ensure_dir, remove_with_caption, scan_image_files, write_caption};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Parameters of a new project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProjectParam {
    pub name: String,
    /// Parent directory. Defaults to the working directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
}

/// A loaded project with absolute paths, as shown by front ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectView {
    pub source: Vec<PreprocessItem>,
    pub dataset: Vec<DatasetFolder>,
    pub model_out_path: PathBuf,
    pub pre_process_path: PathBuf,
    pub dataset_path: PathBuf,
    pub original: Vec<OriginalView>,
    pub path: PathBuf,
    pub params: ProjectParam,
}

/// Originals and preprocess items after linking new outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedOutputs {
    pub original: Vec<OriginalView>,
    pub preprocess: Vec<PreprocessItem>,
}

/// An open project. Cloning shares the same store.
#[derive(Debug, Clone)]
pub struct Project {
    store: ProjectStore,
}

impl Project {
    /// Create `<path>/<name>` with the given resolution and load it.
    #[instrument(skip(param), fields(name = %param.name))]
    pub async fn create(param: NewProjectParam) -> ProjectResult<(Self, ProjectView)> {
        let parent = param.path.clone().unwrap_or_else(|| PathBuf::from("."));
        let layout = ProjectLayout::new(parent.join(&param.name));
        if layout.exists() {
            return Err(ProjectError::AlreadyExists {
                path: layout.root().to_path_buf(),
            });
        }
        ensure_dir(layout.root())?;
        let meta = ProjectMeta {
            params: ProjectParam {
                width: param.width,
                height: param.height,
            },
            ..Default::default()
        };
        write_meta_file(&layout.meta_file(), &meta)?;
        info!(path = %layout.root().display(), "project created");
        Self::open(layout.root()).await
    }

    /// Open the project at `root`, reconciling its files against the metadata.
    #[instrument(skip(root), fields(root = %root.as_ref().display()))]
    pub async fn open(root: impl AsRef<Path>) -> ProjectResult<(Self, ProjectView)> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(ProjectError::SourceNotFound {
                path: root.to_path_buf(),
            });
        }
        let project = Self {
            store: ProjectStore::open(ProjectLayout::new(root))?,
        };
        let view = project.reload().await?;
        Ok((project, view))
    }

    pub fn layout(&self) -> &ProjectLayout {
        self.store.layout()
    }

    pub fn path(&self) -> &Path {
        self.store.layout().root()
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    /// Reconcile originals, then preprocess images, and return the resulting view.
    pub async fn reload(&self) -> ProjectResult<ProjectView> {
        self.store
            .modify(|layout, meta| {
                layout.ensure_dirs()?;
                models::ensure_default_train_config(meta);
                let originals = original::reconcile_originals(layout, meta)?;
                let source = preprocess::reconcile_preprocess(layout, meta, &originals)?;
                Ok(ProjectView {
                    source,
                    dataset: meta.dataset.clone(),
                    model_out_path: layout.model_out_dir(),
                    pre_process_path: layout.preprocess_dir(),
                    dataset_path: layout.dataset_dir(),
                    original: original::to_views(layout, &originals),
                    path: layout.root().to_path_buf(),
                    params: meta.params,
                })
            })
            .await
    }

    pub async fn read_meta(&self) -> ProjectResult<ProjectMeta> {
        self.store.read().await
    }

    pub async fn write_meta(&self, meta: ProjectMeta) -> ProjectResult<()> {
        self.store.write(meta).await.map(|_| ())
    }

    pub async fn update_meta(&self, patch: ProjectMetaPatch) -> ProjectResult<ProjectMeta> {
        self.store.update(patch).await
    }

    /// Reconcile `original/` only.
    pub async fn load_original_images(&self) -> ProjectResult<Vec<OriginalView>> {
        self.store
            .modify(|layout, meta| {
                let items = original::reconcile_originals(layout, meta)?;
                Ok(original::to_views(layout, &items))
            })
            .await
    }

    /// Reconcile `preprocess/` against the current originals.
    pub async fn load_preprocess_images(&self) -> ProjectResult<Vec<PreprocessItem>> {
        self.store
            .modify(|layout, meta| {
                let originals = meta.original.clone();
                preprocess::reconcile_preprocess(layout, meta, &originals)
            })
            .await
    }

    /// Import source images. `progress` runs on the store worker.
    pub async fn import_original_images<F>(&self, sources: Vec<PathBuf>, progress: F) -> ProjectResult<Vec<OriginalView>>
    where
        F: FnMut(&ImportProgress) + Send + 'static,
    {
        self.store
            .modify(move |layout, meta| Ok(original::import_originals(layout, meta, &sources, progress)))
            .await
    }

    /// Link script outputs to their originals, then reconcile preprocess images.
    pub async fn link_preprocess_outputs(&self, outputs: Vec<PreprocessOutput>) -> ProjectResult<LinkedOutputs> {
        self.store
            .modify(move |layout, meta| {
                preprocess::link_outputs(layout, meta, &outputs);
                let originals = meta.original.clone();
                let items = preprocess::reconcile_preprocess(layout, meta, &originals)?;
                Ok(LinkedOutputs {
                    original: original::to_views(layout, &originals),
                    preprocess: items,
                })
            })
            .await
    }

    /// Save a cropped image sent as a PNG data URL.
    pub async fn new_preprocess_image_from_base64(
        &self,
        data_url: String,
        source_file_name: String,
    ) -> ProjectResult<PreprocessItem> {
        self.store
            .modify(move |layout, meta| preprocess::create_from_data_url(layout, meta, &data_url, &source_file_name))
            .await
    }

    pub async fn delete_preprocess_images(&self, hashes: Vec<String>) -> ProjectResult<Vec<String>> {
        self.store
            .modify(move |layout, meta| preprocess::delete_preprocess(layout, meta, &hashes))
            .await
    }

    pub async fn write_caption_history(
        &self,
        file_name: String,
        history: Vec<CaptionHistory>,
    ) -> ProjectResult<Option<Vec<CaptionHistory>>> {
        self.store
            .modify(move |_, meta| Ok(preprocess::merge_caption_history(meta, &file_name, history)))
            .await
    }

    /// Current preprocess items with captions from disk.
    pub async fn preprocess_items(&self) -> ProjectResult<Vec<PreprocessItem>> {
        self.store.modify(|layout, meta| preprocess::to_items(layout, meta)).await
    }

    /// Persist the edited item list and folders, then rebuild `dataset/`.
    ///
    /// Preprocess images no longer in `items` are deleted together with their entries.
    #[instrument(skip_all, fields(items = items.len(), folders = folders.len()))]
    pub async fn save_project(&self, items: Vec<PreprocessItem>, folders: Vec<DatasetFolder>) -> ProjectResult<()> {
        self.store
            .modify(move |layout, meta| {
                for file in scan_image_files(layout.preprocess_dir())? {
                    let listed = items
                        .iter()
                        .any(|item| item.image_path == file.path || item.image_name == file.name);
                    if listed {
                        continue;
                    }
                    info!(file = %file.name, "removing preprocess image dropped from project");
                    remove_with_caption(&file.path)?;
                    let hash = meta
                        .preprocess
                        .iter()
                        .find(|l| l.dest == file.name)
                        .map(|l| l.hash.clone())
                        .unwrap_or_default();
                    meta.preprocess.retain(|l| l.dest != file.name);
                    remove_from_folders(meta, &hash, &file.name, &file.path);
                }
                for item in &items {
                    if item.image_path.is_file() {
                        write_caption(&item.image_path, &item.captions)?;
                    }
                }
                meta.dataset = folders
                    .into_iter()
                    .map(|mut folder| {
                        folder.images.retain(|entry| items.iter().any(|item| references(entry, item)));
                        folder
                    })
                    .collect();
                create_dataset(&items, &meta.dataset, &layout.dataset_dir())
            })
            .await
    }

    /// Materialize `folders` from `items` into `out`, recording the folders in the metadata.
    pub async fn create_dataset(
        &self,
        items: Vec<PreprocessItem>,
        folders: Vec<DatasetFolder>,
        out: PathBuf,
    ) -> ProjectResult<()> {
        self.store
            .modify(move |_, meta| {
                meta.dataset = folders.clone();
                create_dataset(&items, &folders, &out)
            })
            .await
    }

    pub async fn train_configs(&self) -> ProjectResult<Vec<TrainConfig>> {
        Ok(self.store.read().await?.train_configs)
    }

    /// Insert or merge by id. Returns the updated list.
    pub async fn save_train_config(&self, config: TrainConfig) -> ProjectResult<Vec<TrainConfig>> {
        self.store
            .modify(move |_, meta| {
                models::save_train_config(meta, config)?;
                Ok(meta.train_configs.clone())
            })
            .await
    }

    pub async fn delete_train_config(&self, id: String) -> ProjectResult<Vec<TrainConfig>> {
        self.store
            .modify(move |_, meta| {
                models::delete_train_config(meta, &id);
                Ok(meta.train_configs.clone())
            })
            .await
    }

    /// Record a model reported by the training callback.
    pub async fn on_lora_saved(&self, save_path: String) -> ProjectResult<LoraModel> {
        self.store
            .modify(move |_, meta| Ok(models::record_model(meta, &save_path)))
            .await
    }

    /// Attach a preview to a model. `None` when the model is unknown.
    pub async fn link_preview_image(
        &self,
        image_path: PathBuf,
        model_path: String,
        props: Option<Value>,
    ) -> ProjectResult<Option<LoraModel>> {
        self.store
            .modify(move |layout, meta| {
                Ok(models::link_preview(meta, &image_path, &model_path, props)
                    .map(|model| models::model_views(layout, std::slice::from_ref(&model)))
                    .and_then(|mut views| views.pop()))
            })
            .await
    }

    pub async fn load_models(&self) -> ProjectResult<Vec<LoraModel>> {
        self.store
            .modify(|layout, meta| Ok(models::model_views(layout, &meta.models)))
            .await
    }

    /// Delete a model and its file. Returns the remaining models.
    pub async fn delete_model(&self, model_path: String) -> ProjectResult<Vec<LoraModel>> {
        self.store
            .modify(move |layout, meta| {
                models::delete_model(meta, &model_path)?;
                Ok(models::model_views(layout, &meta.models))
            })
            .await
    }

    pub async fn save_preview_props(&self, props: Value) -> ProjectResult<()> {
        self.store
            .update(ProjectMetaPatch {
                preview_props: Some(props),
                ..Default::default()
            })
            .await
            .map(|_| ())
    }

    pub async fn preview_props(&self) -> ProjectResult<Option<Value>> {
        Ok(self.store.read().await?.preview_props)
    }
}
