//! Train command implementation.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};
use sdtrainer_common_config::{LoraPreset, DEFAULT_PRESET_NAME};
use sdtrainer_common_core::random_string;
use sdtrainer_project::TrainConfig;
use sdtrainer_runner::args::{TrainCommand as LaunchCommand, TrainingConfig};
use sdtrainer_server::DEFAULT_CALLBACK_PORT;
use sdtrainer_service::{bind_callback_server, serve_callbacks};
use serde_json::{Map, Value};
use tracing::info;

use super::parse_key_value;
use crate::cli::CommandContext;
use crate::error::CliError;
use crate::output::{print_output, EventPrinter, FormattedOutput};

/// Launch training and manage parameter presets
#[derive(Debug, Parser)]
pub struct TrainCommand {
    #[command(subcommand)]
    action: TrainAction,
}

#[derive(Debug, Subcommand)]
enum TrainAction {
    /// Print the resolved terminal launch without running it
    Preview(TrainingArgs),

    /// Open a terminal running the training and follow its callbacks
    Start {
        #[command(flatten)]
        training: TrainingArgs,

        /// First port tried for the callback server
        #[arg(long, env = "SDTRAINER_CALLBACK_PORT", default_value_t = DEFAULT_CALLBACK_PORT)]
        port: u16,

        /// Launch and exit without running the callback server
        #[arg(long)]
        no_serve: bool,
    },

    /// Run `accelerate config` in a terminal
    AccelerateConfig,

    /// Manage parameter presets
    Presets {
        #[command(subcommand)]
        action: Option<PresetAction>,
    },

    /// Store a training configuration in the project
    SaveConfig {
        /// Configuration as a JSON file
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Remove a stored training configuration
    DeleteConfig {
        /// Configuration id
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum PresetAction {
    /// Built-in presets followed by user presets
    List,

    /// Store a user preset; params merge into a preset of the same name
    Add {
        name: String,

        /// Parameter, e.g. `--param max_train_epochs=10`
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        params: Vec<(String, Value)>,
    },

    /// Remove a user preset
    Remove { name: String },
}

/// Where the training parameters come from.
#[derive(Debug, Args)]
struct TrainingArgs {
    /// Full training configuration as a JSON file
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with_all = ["preset", "output_name", "output_dir"])]
    config: Option<PathBuf>,

    /// Preset the parameters start from
    #[arg(long, default_value = DEFAULT_PRESET_NAME)]
    preset: String,

    /// Name of the trained model; defaults to the project name
    #[arg(long)]
    output_name: Option<String>,

    /// Output directory; defaults to the project's model_out folder
    #[arg(long, value_hint = ValueHint::DirPath)]
    output_dir: Option<PathBuf>,

    /// Override one parameter, e.g. `--param learning_rate=0.0001`
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    params: Vec<(String, Value)>,
}

impl TrainingArgs {
    async fn resolve(&self, ctx: &CommandContext) -> Result<TrainingConfig, CliError> {
        if let Some(path) = &self.config {
            let mut config: TrainingConfig = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            config.params.extend(self.params.iter().cloned());
            return Ok(config);
        }

        let view = ctx.open_project().await?;
        let preset = ctx
            .app
            .list_presets()?
            .into_iter()
            .find(|p| p.name == self.preset)
            .ok_or_else(|| CliError::not_found("preset", self.preset.clone()))?;
        let mut params = preset.params;
        params.extend(self.params.iter().cloned());
        Ok(TrainingConfig {
            output_name: self
                .output_name
                .clone()
                .unwrap_or_else(|| sdtrainer_common_fs::file_name_string(&view.path)),
            output_dir: self.output_dir.clone().unwrap_or(view.model_out_path),
            params,
        })
    }
}

impl FormattedOutput for LaunchCommand {
    fn format_text(&self) -> String {
        format!(
            "cwd: {}\n{} {}\ntraining: {}",
            self.python_exec.display(),
            self.command,
            self.args.join(" "),
            self.training_args.join(" ")
        )
    }
}

impl TrainCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        match &self.action {
            TrainAction::Preview(training) => {
                let config = training.resolve(ctx).await?;
                let launch = ctx.app.train_preview(&config)?;
                print_output(ctx, &launch)
            }
            TrainAction::Start {
                training,
                port,
                no_serve,
            } => {
                let config = training.resolve(ctx).await?;
                if *no_serve {
                    let pid = ctx.app.start_training(&config).await?;
                    return print_output(ctx, &serde_json::json!({ "pid": pid }));
                }

                let server = bind_callback_server(&ctx.app, *port).await?;
                let pid = ctx.app.start_training(&config).await?;
                info!(pid, callback = %server.callback_url(), "training launched, waiting for callbacks");
                if !ctx.is_json() {
                    println!("training started (pid {pid}), press Ctrl-C to stop following");
                }
                let printer = EventPrinter::start(ctx.app.bus(), ctx.format);
                let served = serve_callbacks(ctx.app.clone(), server, sdtrainer_server::shutdown_signal()).await;
                printer.finish().await;
                Ok(served?)
            }
            TrainAction::AccelerateConfig => {
                let pid = ctx.app.accelerate_config().await?;
                print_output(ctx, &serde_json::json!({ "pid": pid }))
            }
            TrainAction::Presets { action } => match action {
                None | Some(PresetAction::List) => print_output(ctx, ctx.app.list_presets()?.as_slice()),
                Some(PresetAction::Add { name, params }) => {
                    let params: Map<String, Value> = params.iter().cloned().collect();
                    let presets = ctx.app.add_preset(LoraPreset::new(name.clone(), params))?;
                    print_output(ctx, presets.as_slice())
                }
                Some(PresetAction::Remove { name }) => {
                    let presets = ctx.app.remove_preset(name)?;
                    print_output(ctx, presets.as_slice())
                }
            },
            TrainAction::SaveConfig { file } => {
                ctx.open_project().await?;
                let mut config: TrainConfig = serde_json::from_str(&std::fs::read_to_string(file)?)?;
                if config.id.is_none() {
                    config.id = Some(random_string(8));
                }
                let configs = ctx.app.save_train_config(config).await?;
                print_output(ctx, configs.as_slice())
            }
            TrainAction::DeleteConfig { id } => {
                ctx.open_project().await?;
                let configs = ctx.app.delete_train_config(id.clone()).await?;
                print_output(ctx, configs.as_slice())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_training_args_parse() {
        let cmd = TrainCommand::try_parse_from([
            "train",
            "preview",
            "--preset",
            "default",
            "--param",
            "max_train_epochs=4",
            "--output-name",
            "demo",
        ])
        .unwrap();
        let TrainAction::Preview(args) = cmd.action else {
            panic!("expected preview");
        };
        assert_eq!(args.output_name.as_deref(), Some("demo"));
        assert_eq!(args.params, vec![("max_train_epochs".to_string(), json!(4))]);
    }

    #[test]
    fn test_config_file_conflicts_with_preset() {
        assert!(TrainCommand::try_parse_from(["train", "preview", "--config", "a.json", "--preset", "x"]).is_err());
    }
}
