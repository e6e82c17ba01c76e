//! Shared application state.

use crate::error::{ServiceError, ServiceResult};
use crate::events::{EventBus, UiEvent};
use parking_lot::RwLock;
use sdtrainer_common_config::{AppPaths, LoraConfig, SettingsStore, TrainerSettings};
use sdtrainer_common_fs::ensure_dir;
use sdtrainer_project::Project;
use sdtrainer_runner::args::TerminalPlatform;
use sdtrainer_runner::{resolve_python, ScriptArgs, ScriptCommand, TaskKind, TaskSupervisor};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Process-wide values other components read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    /// Where the training process posts its callbacks, once the server is bound.
    pub callback_url: Option<String>,
}

/// One supervisor per task kind.
#[derive(Debug)]
struct Supervisors {
    preprocess: TaskSupervisor,
    caption: TaskSupervisor,
    segment: TaskSupervisor,
    generate: TaskSupervisor,
    doctor: TaskSupervisor,
    install: TaskSupervisor,
}

impl Supervisors {
    fn new() -> Self {
        Self {
            preprocess: TaskSupervisor::new(TaskKind::Preprocess),
            caption: TaskSupervisor::new(TaskKind::Caption),
            segment: TaskSupervisor::new(TaskKind::Segment),
            generate: TaskSupervisor::new(TaskKind::Generate),
            doctor: TaskSupervisor::new(TaskKind::Doctor),
            install: TaskSupervisor::new(TaskKind::Install),
        }
    }

    fn get(&self, kind: TaskKind) -> &TaskSupervisor {
        match kind {
            TaskKind::Preprocess => &self.preprocess,
            TaskKind::Caption => &self.caption,
            TaskKind::Segment => &self.segment,
            TaskKind::Generate => &self.generate,
            TaskKind::Doctor => &self.doctor,
            TaskKind::Install => &self.install,
        }
    }
}

/// Settings, the open project, running tasks, and the event bus.
///
/// Shared behind an `Arc` by the CLI, the callback server, and background flows.
pub struct AppContext {
    paths: AppPaths,
    settings: SettingsStore,
    project: tokio::sync::RwLock<Option<Project>>,
    supervisors: Supervisors,
    state: RwLock<AppState>,
    bus: EventBus,
    platform: TerminalPlatform,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("data_dir", &self.paths.data_dir())
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Create the data directories and open the settings file under `paths`.
    pub fn new(paths: AppPaths) -> ServiceResult<Self> {
        for dir in paths.required_dirs() {
            ensure_dir(&dir)?;
        }
        let settings = SettingsStore::open(paths.settings_file())?;
        Ok(Self::with_settings(paths, settings))
    }

    pub fn with_settings(paths: AppPaths, settings: SettingsStore) -> Self {
        Self {
            paths,
            settings,
            project: tokio::sync::RwLock::new(None),
            supervisors: Supervisors::new(),
            state: RwLock::new(AppState::default()),
            bus: EventBus::new(),
            platform: TerminalPlatform::current(),
        }
    }

    /// Override the platform used to build terminal launches.
    pub fn with_platform(mut self, platform: TerminalPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn platform(&self) -> TerminalPlatform {
        self.platform
    }

    pub fn emit(&self, event: UiEvent) {
        self.bus.emit(event);
    }

    pub fn supervisor(&self, kind: TaskKind) -> &TaskSupervisor {
        self.supervisors.get(kind)
    }

    pub fn state(&self) -> AppState {
        self.state.read().clone()
    }

    pub fn callback_url(&self) -> Option<String> {
        self.state.read().callback_url.clone()
    }

    pub fn set_callback_url(&self, url: impl Into<String>) {
        let url = url.into();
        info!(%url, "callback url set");
        self.state.write().callback_url = Some(url);
    }

    /// The open project, or [`ServiceError::NoProject`].
    pub async fn project(&self) -> ServiceResult<Project> {
        self.project.read().await.clone().ok_or(ServiceError::NoProject)
    }

    pub async fn current_project(&self) -> Option<Project> {
        self.project.read().await.clone()
    }

    /// Make `project` the open project and move it to the front of the recent list.
    #[instrument(skip_all, fields(path = %project.path().display()))]
    pub async fn set_project(&self, project: Project) -> ServiceResult<()> {
        self.settings
            .add_recent_project(&project.path().display().to_string())?;
        *self.project.write().await = Some(project);
        info!("project opened");
        Ok(())
    }

    pub async fn close_project(&self) -> Option<Project> {
        self.project.write().await.take()
    }

    pub fn trainer_settings(&self) -> ServiceResult<TrainerSettings> {
        Ok(self.settings.trainer_settings()?)
    }

    pub fn lora_config(&self) -> ServiceResult<LoraConfig> {
        Ok(self.settings.lora_config()?)
    }

    /// Repository holding the preprocess, caption, segment, generate, and doctor scripts.
    pub fn script_repo(&self) -> ServiceResult<PathBuf> {
        self.lora_config()?
            .script_repo()
            .ok_or_else(|| ServiceError::not_configured("preprocessRepo"))
    }

    /// Repository `train_network.py` is launched from.
    pub fn train_repo(&self) -> ServiceResult<PathBuf> {
        self.lora_config()?
            .train_repo()
            .ok_or_else(|| ServiceError::not_configured("loraPythonExec"))
    }

    /// Interpreter for scripts in `repo`, honoring the standalone python setting.
    pub fn python_for(&self, repo: &Path) -> ServiceResult<PathBuf> {
        let settings = self.trainer_settings()?;
        Ok(resolve_python(repo, settings.existing_trainer_python().as_deref()))
    }

    /// The command for `args` in the script repo, with the proxy applied.
    pub fn script_command<A: ScriptArgs>(&self, args: &A) -> ServiceResult<ScriptCommand> {
        let repo = self.script_repo()?;
        let python = self.python_for(&repo)?;
        let proxy = self.trainer_settings()?.proxy_env();
        Ok(args.command(&repo, &python).envs(proxy))
    }

    /// Interrupt the running task of `kind`. `false` when nothing was running.
    pub async fn interrupt(&self, kind: TaskKind) -> ServiceResult<bool> {
        Ok(self.supervisor(kind).interrupt().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdtrainer_common_config::LoraConfig;

    fn context(dir: &Path) -> AppContext {
        AppContext::new(AppPaths::new(dir.join("data"))).unwrap()
    }

    #[tokio::test]
    async fn test_no_project_until_set() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        assert!(matches!(ctx.project().await, Err(ServiceError::NoProject)));

        let (project, _) = Project::open(dir.path().join("data")).await.unwrap();
        ctx.set_project(project).await.unwrap();
        assert!(ctx.project().await.is_ok());
        assert_eq!(ctx.settings().recent_projects().unwrap().len(), 1);
        assert!(ctx.close_project().await.is_some());
        assert!(ctx.current_project().await.is_none());
    }

    #[test]
    fn test_repo_must_be_configured() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        assert!(matches!(
            ctx.script_repo(),
            Err(ServiceError::NotConfigured { what }) if what == "preprocessRepo"
        ));

        ctx.settings()
            .save_lora_config(&LoraConfig {
                preprocess_repo: Some("/repo".into()),
                lora_python_exec: Some("/repo".into()),
            })
            .unwrap();
        assert_eq!(ctx.script_repo().unwrap(), PathBuf::from("/repo"));
        assert_eq!(ctx.python_for(Path::new("/repo")).unwrap(), PathBuf::from("/repo").join(sdtrainer_runner::command::venv_python_bin()));
    }

    #[test]
    fn test_supervisor_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        for kind in TaskKind::ALL {
            assert_eq!(ctx.supervisor(kind).kind(), kind);
        }
        assert!(ctx.callback_url().is_none());
        ctx.set_callback_url("http://localhost:6745");
        assert_eq!(ctx.state().callback_url.as_deref(), Some("http://localhost:6745"));
    }
}
