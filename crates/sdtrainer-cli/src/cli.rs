//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand, ValueHint};
use sdtrainer_common_config::AppPaths;
use sdtrainer_project::ProjectView;
use sdtrainer_service::{AppContext, ServiceError};
use tracing::debug;

use crate::commands::{
    CaptionCommand, ConfigCommand, CropCommand, DatasetCommand, DeleteImagesCommand, DoctorCommand, GenerateCommand,
    ImportCommand, InstallCommand, LogCommand, ModelsCommand, PreprocessCommand, ProjectCommand, RepoCommand,
    SegmentCommand, ServeCommand, SettingsCommand, TrainCommand,
};
use crate::error::CliError;

/// sdtrainer - LoRA training workbench for Stable Diffusion
///
/// Manage training projects and drive the preprocessing, captioning,
/// preview, and training scripts of an sd-scripts checkout.
#[derive(Debug, Parser)]
#[command(
    name = "sdtrainer",
    author,
    version,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true,
    help_template = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
"
)]
pub struct Cli {
    /// Increase verbosity level (-v, -vv, -vvv)
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase verbosity level"
    )]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(
        short,
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Suppress non-error output"
    )]
    pub quiet: bool,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        help = "Output format (text, json)"
    )]
    pub format: OutputFormat,

    /// Application data directory holding settings.json and logs
    #[arg(
        long,
        global = true,
        env = "SDTRAINER_DATA_DIR",
        value_hint = ValueHint::DirPath
    )]
    pub data_dir: Option<PathBuf>,

    /// Project directory to open; defaults to the most recent project
    #[arg(
        short,
        long,
        global = true,
        env = "SDTRAINER_PROJECT",
        value_hint = ValueHint::DirPath
    )]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    // === Projects ===

    /// Create, open, and list projects
    Project(ProjectCommand),

    /// Import original images into the project
    Import(ImportCommand),

    /// Delete preprocessed images by hash
    DeleteImages(DeleteImagesCommand),

    /// Add a hand-cropped PNG as a preprocessed image
    Crop(CropCommand),

    /// Crop and resize originals with the preprocess script
    Preprocess(PreprocessCommand),

    /// Tag preprocessed images
    Caption(CaptionCommand),

    /// Cut characters out of preprocessed images
    Segment(SegmentCommand),

    /// Build and inspect the training dataset
    Dataset(DatasetCommand),

    // === Training ===

    /// Launch training and manage parameter presets
    Train(TrainCommand),

    /// Render a preview image with a trained model
    Generate(GenerateCommand),

    /// List, delete, and export trained models
    Models(ModelsCommand),

    /// Run the training callback server
    Serve(ServeCommand),

    // === Environment ===

    /// Install the training scripts
    Install(InstallCommand),

    /// Update or inspect the installed script repository
    Repo(RepoCommand),

    /// Check the Python environment of the script repository
    Doctor(DoctorCommand),

    /// Read and write raw settings keys
    Config(ConfigCommand),

    /// Show and change trainer settings
    Settings(SettingsCommand),

    /// Application log file
    Log(LogCommand),
}

impl Cli {
    /// Application paths from `--data-dir`, else the platform default.
    pub fn app_paths(&self) -> AppPaths {
        match &self.data_dir {
            Some(dir) => AppPaths::new(dir),
            None => AppPaths::from_env(),
        }
    }

    /// Execute the selected command
    pub async fn execute(self) -> Result<(), CliError> {
        let app = AppContext::new(self.app_paths())?;
        let ctx = CommandContext {
            app: Arc::new(app),
            format: self.format,
            verbose: self.verbose,
            project: self.project,
        };

        match self.command {
            Command::Project(cmd) => cmd.execute(&ctx).await,
            Command::Import(cmd) => cmd.execute(&ctx).await,
            Command::DeleteImages(cmd) => cmd.execute(&ctx).await,
            Command::Crop(cmd) => cmd.execute(&ctx).await,
            Command::Preprocess(cmd) => cmd.execute(&ctx).await,
            Command::Caption(cmd) => cmd.execute(&ctx).await,
            Command::Segment(cmd) => cmd.execute(&ctx).await,
            Command::Dataset(cmd) => cmd.execute(&ctx).await,
            Command::Train(cmd) => cmd.execute(&ctx).await,
            Command::Generate(cmd) => cmd.execute(&ctx).await,
            Command::Models(cmd) => cmd.execute(&ctx).await,
            Command::Serve(cmd) => cmd.execute(&ctx).await,
            Command::Install(cmd) => cmd.execute(&ctx).await,
            Command::Repo(cmd) => cmd.execute(&ctx).await,
            Command::Doctor(cmd) => cmd.execute(&ctx).await,
            Command::Config(cmd) => cmd.execute(&ctx).await,
            Command::Settings(cmd) => cmd.execute(&ctx).await,
            Command::Log(cmd) => cmd.execute(&ctx).await,
        }
    }
}

/// Context passed to all commands
#[derive(Debug)]
pub struct CommandContext {
    pub app: Arc<AppContext>,
    pub format: OutputFormat,
    pub verbose: u8,
    pub project: Option<PathBuf>,
}

impl CommandContext {
    /// Project directory for commands that work on a project.
    pub fn project_dir(&self) -> Result<PathBuf, CliError> {
        if let Some(dir) = &self.project {
            return Ok(dir.clone());
        }
        let recent = self.app.recent_projects()?;
        recent
            .into_iter()
            .next()
            .map(|p| PathBuf::from(p.path))
            .ok_or_else(|| ServiceError::NoProject.into())
    }

    /// Open the project from `--project` or the recent list.
    pub async fn open_project(&self) -> Result<ProjectView, CliError> {
        let dir = self.project_dir()?;
        debug!(project = %dir.display(), "opening project");
        Ok(self.app.open_project(&dir).await?)
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}
