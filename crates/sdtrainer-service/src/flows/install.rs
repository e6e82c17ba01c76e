//! Installing and updating the trainer script repository.

use super::require_exit;
use crate::context::AppContext;
use crate::error::{ServiceError, ServiceResult};
use crate::events::{CloneProgress, EventBus, InstallMessage, InstallStage, UiEvent};
use sdtrainer_common_config::LoraConfig;
use sdtrainer_git::{clone_repo, pull, train_repo_url, CloneOpts, PullOutcome, TransferProgress, TransferStage};
use sdtrainer_runner::args::SetupScript;
use sdtrainer_runner::{ScriptEvent, TaskKind, TaskMessage};
use sdtrainer_common_log::spans::Timer;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};

/// Clone directory of the trainer repository inside the install dir.
pub const TRAIN_REPO_DIR: &str = "repo-train";
/// Preprocess repository directory checked by older installs.
pub const PREPROCESS_REPO_DIR: &str = "repo-preprocess";
/// Name reported with clone progress.
pub const TRAIN_REPO_NAME: &str = "lora_train_core";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallRequest {
    pub install_dir: PathBuf,
    /// Clone from here instead of the upstream (or CN mirror) URL.
    pub repo_url: Option<String>,
}

/// Forwards git progress to the bus when the stage or whole percentage changes.
struct ProgressRelay {
    bus: EventBus,
    last: Option<(TransferStage, u8)>,
}

impl ProgressRelay {
    fn new(bus: EventBus) -> Self {
        Self { bus, last: None }
    }

    fn report(&mut self, progress: &TransferProgress) {
        let key = (progress.stage, progress.percent());
        if self.last == Some(key) {
            return;
        }
        self.last = Some(key);
        self.bus.emit(UiEvent::CloneProgress(CloneProgress {
            progress: f64::from(progress.percent()),
            name: TRAIN_REPO_NAME.to_string(),
        }));
        self.bus.emit(UiEvent::InstallLog(InstallMessage::info(
            InstallStage::Message,
            progress.to_string(),
        )));
    }
}

impl AppContext {
    fn install_log(&self, stage: InstallStage, message: impl Into<String>) {
        self.emit(UiEvent::InstallLog(InstallMessage::info(stage, message)));
    }

    fn install_failed(&self, error: ServiceError) -> ServiceError {
        error!(error = %error, "install failed");
        self.emit(UiEvent::InstallLog(InstallMessage::error(error.to_string())));
        error
    }

    /// Clone the trainer repo into `<install_dir>/repo-train`, run its setup
    /// script, and point both repo settings at it.
    ///
    /// An existing clone target is replaced. A failed setup leaves the clone
    /// in place and the settings untouched.
    #[instrument(skip_all, fields(install_dir = %request.install_dir.display()))]
    pub async fn install_repo(&self, request: InstallRequest) -> ServiceResult<PathBuf> {
        let timer = Timer::start("install");
        self.install_log(InstallStage::StartInstall, "start install");
        let settings = self.trainer_settings()?;
        let train_path = request.install_dir.join(TRAIN_REPO_DIR);
        self.install_log(InstallStage::Message, "clone train path");
        self.install_log(
            InstallStage::Message,
            format!("install train path to: {}", train_path.display()),
        );

        let url = request
            .repo_url
            .clone()
            .unwrap_or_else(|| train_repo_url(settings.lora_script_cn_repo.unwrap_or(false)).to_string());
        let opts = CloneOpts::new(url, &train_path).proxy(settings.proxy.clone());
        let mut relay = ProgressRelay::new(self.bus().clone());
        let cloned = tokio::task::spawn_blocking(move || clone_repo(&opts, |p| relay.report(p))).await;
        match cloned {
            Ok(Ok(path)) => info!(path = %path.display(), "clone train repo success"),
            Ok(Err(e)) => return Err(self.install_failed(e.into())),
            Err(e) => return Err(self.install_failed(e.into())),
        }

        self.install_log(InstallStage::Message, "install train");
        let setup = SetupScript {
            platform: self.platform(),
            use_cn: settings.lora_script_install_with_cn.unwrap_or(false),
            trainer_python: settings.existing_trainer_python(),
        };
        let command = setup.command(&train_path).envs(settings.proxy_env());
        let mut run = self
            .supervisor(TaskKind::Install)
            .start(&command)
            .map_err(|e| self.install_failed(e.into()))?;

        let mut exit = None;
        while let Some(message) = run.next().await {
            match message {
                TaskMessage::Event(ScriptEvent::Log(line)) | TaskMessage::Stderr(line) => {
                    self.install_log(InstallStage::Message, line)
                }
                TaskMessage::Event(_) => {}
                TaskMessage::Exit(status) => exit = Some(status),
            }
        }
        let exit = require_exit(TaskKind::Install, exit)?;
        let code = exit
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        self.install_log(InstallStage::Message, format!("Child exited with code {code}"));
        if !exit.success() {
            return Err(self.install_failed(ServiceError::TaskFailed {
                kind: TaskKind::Install,
                code: exit.code,
            }));
        }

        self.install_log(InstallStage::Message, "install success save config");
        let repo = train_path.display().to_string();
        let mut config = self.lora_config()?;
        config.preprocess_repo = Some(repo.clone());
        config.lora_python_exec = Some(repo);
        self.settings().save_lora_config(&config)?;
        self.install_log(InstallStage::InstallSuccess, "install success");
        timer.finish();
        Ok(train_path)
    }

    /// Fast-forward the installed trainer repo to its upstream branch.
    #[instrument(skip_all)]
    pub async fn update_repo(&self) -> ServiceResult<PullOutcome> {
        let repo = self.train_repo()?;
        let proxy = self.trainer_settings()?.proxy.filter(|p| !p.is_empty());
        let mut relay = ProgressRelay::new(self.bus().clone());
        let outcome =
            tokio::task::spawn_blocking(move || pull(&repo, proxy.as_deref(), |p| relay.report(p))).await??;
        info!(?outcome, "train repo updated");
        Ok(outcome)
    }

    /// Whether the repos under `target`, or the configured ones, are missing.
    pub fn check_need_install(&self, target: Option<&Path>) -> ServiceResult<bool> {
        let (preprocess, train) = match target {
            Some(dir) => (Some(dir.join(PREPROCESS_REPO_DIR)), Some(dir.join(TRAIN_REPO_DIR))),
            None => {
                let config = self.lora_config()?;
                (config.script_repo(), config.train_repo())
            }
        };
        match (preprocess, train) {
            (Some(preprocess), Some(train)) => Ok(!preprocess.exists() || !train.exists()),
            _ => Ok(true),
        }
    }

    /// Point the repo settings at an existing install under `target`.
    pub fn set_install_dir(&self, target: &Path) -> ServiceResult<LoraConfig> {
        let config = LoraConfig {
            preprocess_repo: Some(target.join(PREPROCESS_REPO_DIR).display().to_string()),
            lora_python_exec: Some(target.join(TRAIN_REPO_DIR).display().to_string()),
        };
        self.settings().save_lora_config(&config)?;
        Ok(config)
    }
}
