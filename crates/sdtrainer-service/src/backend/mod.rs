//! Where project operations run: on this machine or on a remote trainer service.

pub mod local;
pub mod remote;

pub use local::LocalBackend;
pub use remote::{ApiResponse, RemoteBackend, DEFAULT_REMOTE_URL};

use crate::context::AppContext;
use crate::error::ServiceResult;
use crate::flows::library::RecentProject;
use async_trait::async_trait;
use sdtrainer_common_config::{vars, Environment};
use sdtrainer_project::{LoraModel, NewProjectParam, ProjectView, TrainConfig};
use sdtrainer_runner::args::PreprocessConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A project known to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedProject {
    pub name: String,
}

/// Project operations with a local and a remote implementation.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn new_project(&self, param: NewProjectParam) -> ServiceResult<ProjectView>;

    /// Open a project by path (local) or id (remote).
    async fn load_project(&self, project_path: &str) -> ServiceResult<ProjectView>;

    async fn list_train_configs(&self) -> ServiceResult<Vec<TrainConfig>>;

    async fn load_models(&self) -> ServiceResult<Vec<LoraModel>>;

    async fn recent_projects(&self) -> ServiceResult<Vec<RecentProject>>;

    async fn project_list(&self) -> ServiceResult<Vec<SavedProject>>;

    /// Preprocess images of the open project. Progress arrives on the event bus.
    async fn make_preprocess(&self, config: PreprocessConfig) -> ServiceResult<()>;
}

/// The remote backend when `SDTRAINER_REMOTE` is set, otherwise the local one.
pub fn select_backend(ctx: Arc<AppContext>) -> ServiceResult<Arc<dyn Backend>> {
    if Environment::is_remote_mode() {
        let url = Environment::get(vars::SDTRAINER_REMOTE_URL).unwrap_or_else(|| DEFAULT_REMOTE_URL.to_string());
        info!(%url, "using remote backend");
        return Ok(Arc::new(RemoteBackend::new(&url)?));
    }
    Ok(Arc::new(LocalBackend::new(ctx)))
}
