//! Opening projects and editing their images, dataset, and models.

use crate::context::AppContext;
use crate::error::ServiceResult;
use crate::events::UiEvent;
use sdtrainer_project::{
    export_model, load_dataset_dir, DatasetFolder, LoraModel, NewProjectParam, OriginalView, PreprocessItem, Project, ProjectView,
    TrainConfig,
};
use sdtrainer_common_log::spans::Timer;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::instrument;

impl AppContext {
    /// Create a project and make it the open one.
    #[instrument(skip_all, fields(name = %param.name))]
    pub async fn new_project(&self, param: NewProjectParam) -> ServiceResult<ProjectView> {
        let (project, view) = Project::create(param).await?;
        self.set_project(project).await?;
        Ok(view)
    }

    /// Open the project at `path`, reconciling it with its folders.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open_project(&self, path: impl AsRef<Path>) -> ServiceResult<ProjectView> {
        let (project, view) = Project::open(path).await?;
        self.set_project(project).await?;
        Ok(view)
    }

    pub async fn reload_project(&self) -> ServiceResult<ProjectView> {
        Ok(self.project().await?.reload().await?)
    }

    /// Copy source images into the project, reporting each file as [`UiEvent::ImportProgress`].
    pub async fn import_images(&self, sources: Vec<PathBuf>) -> ServiceResult<Vec<OriginalView>> {
        let project = self.project().await?;
        let bus = self.bus().clone();
        Ok(project
            .import_original_images(sources, move |progress| {
                bus.emit(UiEvent::ImportProgress(progress.clone()))
            })
            .await?)
    }

    pub async fn delete_preprocess_images(&self, hashes: Vec<String>) -> ServiceResult<Vec<String>> {
        let removed = self.project().await?.delete_preprocess_images(hashes).await?;
        self.emit(UiEvent::PreprocessImageRemoved(removed.clone()));
        Ok(removed)
    }

    /// Save a cropped PNG data URL as a new preprocess image of `source_file_name`.
    pub async fn save_preprocess_image(
        &self,
        data_url: String,
        source_file_name: String,
    ) -> ServiceResult<PreprocessItem> {
        let item = self
            .project()
            .await?
            .new_preprocess_image_from_base64(data_url, source_file_name)
            .await?;
        self.emit(UiEvent::NewPreprocessImage(item.clone()));
        Ok(item)
    }

    pub async fn preprocess_items(&self) -> ServiceResult<Vec<PreprocessItem>> {
        Ok(self.project().await?.preprocess_items().await?)
    }

    /// Persist edits and rebuild `dataset/`. `None` keeps the stored items and folders.
    pub async fn save_project(
        &self,
        items: Option<Vec<PreprocessItem>>,
        folders: Option<Vec<DatasetFolder>>,
    ) -> ServiceResult<()> {
        let project = self.project().await?;
        let items = match items {
            Some(items) => items,
            None => project.preprocess_items().await?,
        };
        let folders = match folders {
            Some(folders) => folders,
            None => project.read_meta().await?.dataset,
        };
        Ok(project.save_project(items, folders).await?)
    }

    /// Materialize the stored folders into `out`, or the project's `dataset/`.
    pub async fn build_dataset(&self, out: Option<PathBuf>) -> ServiceResult<PathBuf> {
        let timer = Timer::start("build_dataset");
        let project = self.project().await?;
        let out = out.unwrap_or_else(|| project.layout().dataset_dir());
        let items = project.preprocess_items().await?;
        let folders = project.read_meta().await?.dataset;
        project.create_dataset(items, folders, out.clone()).await?;
        timer.finish();
        Ok(out)
    }

    /// Folders of an existing `<step>_<name>` tree.
    pub async fn load_dataset_dir(&self, path: PathBuf) -> ServiceResult<Vec<DatasetFolder>> {
        Ok(tokio::task::spawn_blocking(move || load_dataset_dir(&path)).await??)
    }

    pub async fn train_configs(&self) -> ServiceResult<Vec<TrainConfig>> {
        Ok(self.project().await?.train_configs().await?)
    }

    pub async fn save_train_config(&self, config: TrainConfig) -> ServiceResult<Vec<TrainConfig>> {
        Ok(self.project().await?.save_train_config(config).await?)
    }

    pub async fn delete_train_config(&self, id: String) -> ServiceResult<Vec<TrainConfig>> {
        Ok(self.project().await?.delete_train_config(id).await?)
    }

    pub async fn load_models(&self) -> ServiceResult<Vec<LoraModel>> {
        Ok(self.project().await?.load_models().await?)
    }

    pub async fn delete_model(&self, model_path: String) -> ServiceResult<Vec<LoraModel>> {
        let models = self.project().await?.delete_model(model_path).await?;
        self.emit(UiEvent::ModelUpdated(models.clone()));
        Ok(models)
    }

    /// Copy a trained model into `dest_dir`.
    pub async fn export_model(&self, model_path: PathBuf, dest_dir: PathBuf) -> ServiceResult<PathBuf> {
        Ok(tokio::task::spawn_blocking(move || export_model(&model_path, &dest_dir)).await??)
    }

    pub async fn save_preview_props(&self, props: Value) -> ServiceResult<()> {
        Ok(self.project().await?.save_preview_props(props).await?)
    }

    pub async fn preview_props(&self) -> ServiceResult<Option<Value>> {
        Ok(self.project().await?.preview_props().await?)
    }
}
