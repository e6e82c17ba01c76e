//! Install and repo command implementations.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};
use sdtrainer_runner::TaskKind;
use sdtrainer_service::InstallRequest;
use serde_json::json;
use tracing::info;

use super::run_task;
use crate::cli::CommandContext;
use crate::error::CliError;
use crate::output::{print_output, EventPrinter, PathOutput};

/// Install the training scripts
///
/// Clones the trainer repository into `<dir>/repo-train`, runs its setup
/// script, and points the repo settings at the clone.
#[derive(Debug, Parser)]
pub struct InstallCommand {
    /// Install directory; defaults to one under the data directory
    #[arg(long, value_hint = ValueHint::DirPath)]
    dir: Option<PathBuf>,

    /// Clone from this URL instead of the upstream repository
    #[arg(long)]
    repo_url: Option<String>,
}

impl InstallCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        let install_dir = self
            .dir
            .clone()
            .unwrap_or_else(|| ctx.app.paths().default_install_dir());
        info!(dir = %install_dir.display(), "installing trainer scripts");
        let request = InstallRequest {
            install_dir,
            repo_url: self.repo_url.clone(),
        };
        let path = run_task(ctx, TaskKind::Install, ctx.app.install_repo(request)).await?;
        print_output(ctx, &PathOutput { path })
    }
}

/// Update or inspect the installed script repository
#[derive(Debug, Parser)]
pub struct RepoCommand {
    #[command(subcommand)]
    action: RepoAction,
}

#[derive(Debug, Subcommand)]
enum RepoAction {
    /// Fast-forward the trainer repository to its upstream branch
    Update,

    /// Whether the scripts still need to be installed
    Check {
        /// Check an install directory instead of the configured repos
        #[arg(long, value_hint = ValueHint::DirPath)]
        dir: Option<PathBuf>,
    },

    /// Point the repo settings at an existing install directory
    Use {
        #[arg(value_hint = ValueHint::DirPath)]
        dir: PathBuf,
    },
}

impl RepoCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        match &self.action {
            RepoAction::Update => {
                let printer = EventPrinter::start(ctx.app.bus(), ctx.format);
                let outcome = ctx.app.update_repo().await;
                printer.finish().await;
                print_output(ctx, &serde_json::to_value(outcome?)?)
            }
            RepoAction::Check { dir } => {
                let need_install = ctx.app.check_need_install(dir.as_deref())?;
                let report = json!({
                    "needInstall": need_install,
                    "preprocessRepo": ctx.app.script_repo().ok(),
                    "trainRepo": ctx.app.train_repo().ok(),
                });
                if ctx.is_json() {
                    return print_output(ctx, &report);
                }
                let status = if need_install { "not installed" } else { "installed" };
                println!("{status}");
                Ok(())
            }
            RepoAction::Use { dir } => {
                if !dir.is_dir() {
                    return Err(CliError::not_found("install directory", dir.display().to_string()));
                }
                let config = ctx.app.set_install_dir(dir)?;
                print_output(ctx, &serde_json::to_value(config)?)
            }
        }
    }
}
