//! Project command implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};
use sdtrainer_project::{NewProjectParam, DEFAULT_RESOLUTION};
use sdtrainer_service::select_backend;
use tracing::info;

use crate::cli::CommandContext;
use crate::error::CliError;
use crate::output::print_output;

/// Create, open, and list projects
#[derive(Debug, Parser)]
pub struct ProjectCommand {
    #[command(subcommand)]
    action: ProjectAction,
}

#[derive(Debug, Subcommand)]
enum ProjectAction {
    /// Create a project folder with an empty project.json
    New {
        /// Project name, also the folder name
        name: String,

        /// Parent directory of the project
        #[arg(long, value_hint = ValueHint::DirPath)]
        path: Option<PathBuf>,

        /// Training resolution width
        #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
        width: u32,

        /// Training resolution height
        #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
        height: u32,
    },

    /// Open a project and reconcile it with the files on disk
    Open {
        /// Project directory; defaults to --project or the most recent project
        #[arg(value_hint = ValueHint::DirPath)]
        dir: Option<PathBuf>,
    },

    /// Recently opened projects, most recent first
    Recent,

    /// Projects known to the backend
    List,

    /// Original images of the project
    Originals,

    /// Preprocessed images with their captions
    Images,

    /// Stored training configurations
    Configs,

    /// Rewrite caption files and dataset folders from the current state
    Save,
}

impl ProjectCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        match &self.action {
            ProjectAction::New {
                name,
                path,
                width,
                height,
            } => {
                if name.trim().is_empty() {
                    return Err(CliError::validation("project name is empty"));
                }
                let backend = select_backend(ctx.app.clone())?;
                let view = backend
                    .new_project(NewProjectParam {
                        name: name.clone(),
                        path: path.clone(),
                        width: *width,
                        height: *height,
                    })
                    .await?;
                info!(path = %view.path.display(), "project created");
                print_output(ctx, &view)
            }
            ProjectAction::Open { dir } => {
                let dir = match dir {
                    Some(dir) => dir.clone(),
                    None => ctx.project_dir()?,
                };
                let backend = select_backend(ctx.app.clone())?;
                let view = backend.load_project(&dir.display().to_string()).await?;
                print_output(ctx, &view)
            }
            ProjectAction::Recent => {
                let recent = ctx.app.recent_projects()?;
                print_output(ctx, recent.as_slice())
            }
            ProjectAction::List => {
                let backend = select_backend(ctx.app.clone())?;
                let projects = backend.project_list().await?;
                print_output(ctx, projects.as_slice())
            }
            ProjectAction::Originals => {
                let view = ctx.open_project().await?;
                print_output(ctx, view.original.as_slice())
            }
            ProjectAction::Images => {
                ctx.open_project().await?;
                let items = ctx.app.preprocess_items().await?;
                print_output(ctx, items.as_slice())
            }
            ProjectAction::Configs => {
                ctx.open_project().await?;
                let configs = ctx.app.train_configs().await?;
                print_output(ctx, configs.as_slice())
            }
            ProjectAction::Save => {
                ctx.open_project().await?;
                ctx.app.save_project(None, None).await?;
                let view = ctx.app.reload_project().await?;
                print_output(ctx, &view)
            }
        }
    }
}
