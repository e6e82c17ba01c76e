use super::{Backend, SavedProject};
use crate::context::AppContext;
use crate::error::{ServiceError, ServiceResult};
use crate::flows::library::RecentProject;
use async_trait::async_trait;
use sdtrainer_project::{LoraModel, NewProjectParam, ProjectView, TrainConfig};
use sdtrainer_runner::args::PreprocessConfig;
use sdtrainer_runner::TaskKind;
use std::sync::Arc;

/// Runs everything in this process against projects on disk.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    ctx: Arc<AppContext>,
}

impl LocalBackend {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn new_project(&self, param: NewProjectParam) -> ServiceResult<ProjectView> {
        self.ctx.new_project(param).await
    }

    async fn load_project(&self, project_path: &str) -> ServiceResult<ProjectView> {
        self.ctx.open_project(project_path).await
    }

    async fn list_train_configs(&self) -> ServiceResult<Vec<TrainConfig>> {
        self.ctx.train_configs().await
    }

    async fn load_models(&self) -> ServiceResult<Vec<LoraModel>> {
        self.ctx.load_models().await
    }

    async fn recent_projects(&self) -> ServiceResult<Vec<RecentProject>> {
        self.ctx.recent_projects()
    }

    /// Local projects have no registry, so this lists the recent ones by name.
    async fn project_list(&self) -> ServiceResult<Vec<SavedProject>> {
        Ok(self
            .ctx
            .recent_projects()?
            .into_iter()
            .map(|p| SavedProject { name: p.name })
            .collect())
    }

    async fn make_preprocess(&self, config: PreprocessConfig) -> ServiceResult<()> {
        let exit = self.ctx.make_preprocess(config).await?;
        if exit.success() || exit.interrupted {
            return Ok(());
        }
        Err(ServiceError::TaskFailed {
            kind: TaskKind::Preprocess,
            code: exit.code,
        })
    }
}
