//! Launching `train_network.py` and managing parameter presets.

use crate::context::AppContext;
use crate::error::{ServiceError, ServiceResult};
use sdtrainer_common_config::LoraPreset;
use sdtrainer_runner::args::{TrainCommand, TrainingConfig};
use sdtrainer_runner::RunnerError;
use sdtrainer_server::DEFAULT_CALLBACK_PORT;
use std::process::Stdio;
use tracing::{info, instrument, warn};

impl AppContext {
    /// The callback url training runs report to.
    ///
    /// Falls back to the default port when no server has been bound in this process.
    pub fn training_callback_url(&self) -> String {
        self.callback_url().unwrap_or_else(|| {
            let url = format!("http://localhost:{DEFAULT_CALLBACK_PORT}");
            warn!(%url, "callback server not bound, using default url");
            url
        })
    }

    /// Resolve the terminal launch for `config` without running it.
    pub fn train_preview(&self, config: &TrainingConfig) -> ServiceResult<TrainCommand> {
        let repo = self.train_repo()?;
        let python = self.python_for(&repo)?;
        Ok(TrainCommand::build(
            config,
            &repo,
            &python,
            &self.training_callback_url(),
            self.platform(),
        ))
    }

    /// Open a terminal running the training. Returns the launcher's pid.
    ///
    /// The terminal is not supervised; progress arrives through the callback server.
    #[instrument(skip_all, fields(output = %config.output_name))]
    pub async fn start_training(&self, config: &TrainingConfig) -> ServiceResult<u32> {
        let launch = self.train_preview(config)?;
        info!(command = %launch.command, args = %launch.args.join(" "), "starting training");
        self.spawn_detached(&launch)
    }

    /// Open a terminal running `accelerate config` in the trainer repo.
    pub async fn accelerate_config(&self) -> ServiceResult<u32> {
        let repo = self.train_repo()?;
        let python = self.python_for(&repo)?;
        let launch = TrainCommand::accelerate_config(&repo, &python, self.platform());
        self.spawn_detached(&launch)
    }

    fn spawn_detached(&self, launch: &TrainCommand) -> ServiceResult<u32> {
        let proxy = self.trainer_settings()?.proxy_env();
        let script = launch.to_script_command().envs(proxy);
        let mut command = script.to_command();
        command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: script.program.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or_default();
        info!(pid, program = %script.program.display(), "terminal launched");
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!(pid, code = ?status.code(), "terminal launcher exited"),
                Err(e) => warn!(pid, error = %e, "failed to wait for terminal launcher"),
            }
        });
        Ok(pid)
    }

    /// Built-in presets followed by user presets.
    pub fn list_presets(&self) -> ServiceResult<Vec<LoraPreset>> {
        Ok(self.settings().presets()?)
    }

    /// Store a user preset, merging params into a stored preset of the same name.
    pub fn add_preset(&self, preset: LoraPreset) -> ServiceResult<Vec<LoraPreset>> {
        if preset.name.is_empty() {
            return Err(ServiceError::InvalidRequest("preset name is empty".to_string()));
        }
        self.settings().add_preset(preset)?;
        self.list_presets()
    }

    pub fn remove_preset(&self, name: &str) -> ServiceResult<Vec<LoraPreset>> {
        self.settings().remove_preset(name)?;
        self.list_presets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdtrainer_common_config::{AppPaths, LoraConfig, DEFAULT_PRESET_NAME};
    use sdtrainer_runner::args::TerminalPlatform;
    use serde_json::json;

    fn context(dir: &std::path::Path) -> AppContext {
        let ctx = AppContext::new(AppPaths::new(dir.join("data")))
            .unwrap()
            .with_platform(TerminalPlatform::Linux);
        ctx.settings()
            .save_lora_config(&LoraConfig {
                preprocess_repo: Some("/repo".into()),
                lora_python_exec: Some("/repo".into()),
            })
            .unwrap();
        ctx
    }

    #[test]
    fn test_preview_uses_bound_callback_url() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        ctx.set_callback_url("http://localhost:6800");
        let config: TrainingConfig = serde_json::from_value(json!({
            "output_name": "demo",
            "output_dir": "/p/model",
            "params": {"network_dim": 32}
        }))
        .unwrap();

        let preview = ctx.train_preview(&config).unwrap();
        assert_eq!(preview.command, "x-terminal-emulator");
        let url = preview.training_args.iter().position(|a| a == "--callback_url").unwrap();
        assert_eq!(preview.training_args[url + 1], "http://localhost:6800");
        assert_eq!(preview.arg_object["--network_dim"], 32);
    }

    #[test]
    fn test_preview_requires_train_repo() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::new(AppPaths::new(dir.path().join("data"))).unwrap();
        let config = TrainingConfig {
            output_name: "demo".into(),
            output_dir: "/out".into(),
            params: Default::default(),
        };
        assert!(matches!(ctx.train_preview(&config), Err(ServiceError::NotConfigured { .. })));
        assert_eq!(ctx.training_callback_url(), "http://localhost:6745");
    }

    #[test]
    fn test_presets_builtin_first() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let mut params = serde_json::Map::new();
        params.insert("network_dim".into(), json!(64));
        let presets = ctx.add_preset(LoraPreset::new("mine", params)).unwrap();
        assert_eq!(presets[0].name, DEFAULT_PRESET_NAME);
        assert_eq!(presets.last().unwrap().name, "mine");

        let presets = ctx.remove_preset("mine").unwrap();
        assert!(presets.iter().all(|p| p.name != "mine"));
        assert!(matches!(
            ctx.add_preset(LoraPreset::new("", Default::default())),
            Err(ServiceError::InvalidRequest(_))
        ));
    }
}
