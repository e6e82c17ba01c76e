//! Models command implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};
use sdtrainer_service::select_backend;

use crate::cli::CommandContext;
use crate::error::CliError;
use crate::output::{print_output, PathOutput};

/// List, delete, and export trained models
#[derive(Debug, Parser)]
pub struct ModelsCommand {
    #[command(subcommand)]
    action: ModelsAction,
}

#[derive(Debug, Subcommand)]
enum ModelsAction {
    /// Models trained in the project, with their previews
    List,

    /// Delete a model and forget it
    Delete {
        /// Model file as listed by `models list`
        path: String,
    },

    /// Copy a model into a directory
    Export {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,

        #[arg(value_hint = ValueHint::DirPath)]
        dest: PathBuf,
    },

    /// Stable Diffusion checkpoints usable for previews
    SdModels,

    /// Pretrained base models
    Pretrained,
}

impl ModelsCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        match &self.action {
            ModelsAction::List => {
                let backend = select_backend(ctx.app.clone())?;
                backend
                    .load_project(&ctx.project_dir()?.display().to_string())
                    .await?;
                let models = backend.load_models().await?;
                print_output(ctx, models.as_slice())
            }
            ModelsAction::Delete { path } => {
                ctx.open_project().await?;
                let models = ctx.app.delete_model(path.clone()).await?;
                print_output(ctx, models.as_slice())
            }
            ModelsAction::Export { path, dest } => {
                ctx.open_project().await?;
                if !path.is_file() {
                    return Err(CliError::not_found("model", path.display().to_string()));
                }
                let path = ctx.app.export_model(path.clone(), dest.clone()).await?;
                print_output(ctx, &PathOutput { path })
            }
            ModelsAction::SdModels => print_output(ctx, ctx.app.stable_diffusion_models()?.as_slice()),
            ModelsAction::Pretrained => print_output(ctx, ctx.app.pretrained_models()?.as_slice()),
        }
    }
}
