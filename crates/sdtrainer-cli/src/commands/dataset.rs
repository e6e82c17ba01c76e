//! Dataset command implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};
use sdtrainer_project::DatasetFolder;
use tracing::info;

use crate::cli::CommandContext;
use crate::error::CliError;
use crate::output::{print_output, PathOutput};

/// Build and inspect the training dataset
#[derive(Debug, Parser)]
pub struct DatasetCommand {
    #[command(subcommand)]
    action: DatasetAction,
}

#[derive(Debug, Subcommand)]
enum DatasetAction {
    /// Dataset folders stored in the project
    List,

    /// Add or replace a folder of preprocessed images
    AddFolder {
        /// Folder name
        name: String,

        /// Repeats per epoch, the numeric prefix of the folder
        #[arg(long, default_value_t = 10)]
        step: u32,

        /// Hashes of the images that belong to the folder
        #[arg(required = true)]
        hashes: Vec<String>,
    },

    /// Remove a folder from the dataset
    RemoveFolder {
        /// Folder name
        name: String,
    },

    /// Materialize the folders as `<step>_<name>` directories of images and captions
    Build {
        /// Output directory; defaults to the project's dataset folder
        #[arg(long, value_hint = ValueHint::DirPath)]
        out: Option<PathBuf>,
    },

    /// Read the folders of an existing `<step>_<name>` directory tree
    Scan {
        #[arg(value_hint = ValueHint::DirPath)]
        dir: PathBuf,
    },
}

impl DatasetCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        if let DatasetAction::Scan { dir } = &self.action {
            let folders = ctx.app.load_dataset_dir(dir.clone()).await?;
            return print_output(ctx, folders.as_slice());
        }
        let view = ctx.open_project().await?;
        match &self.action {
            DatasetAction::List => print_output(ctx, view.dataset.as_slice()),
            DatasetAction::AddFolder { name, step, hashes } => {
                if name.trim().is_empty() {
                    return Err(CliError::validation("folder name is empty"));
                }
                let images = hashes
                    .iter()
                    .map(|hash| {
                        view.source
                            .iter()
                            .find(|item| &item.hash == hash)
                            .map(|item| item.image_name.clone())
                            .ok_or_else(|| CliError::not_found("preprocess image", hash.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let mut folders = view.dataset;
                folders.retain(|f| &f.name != name);
                folders.push(DatasetFolder {
                    name: name.clone(),
                    step: *step,
                    images,
                });
                ctx.app.save_project(None, Some(folders.clone())).await?;
                info!(folder = %name, "dataset folder saved");
                print_output(ctx, folders.as_slice())
            }
            DatasetAction::RemoveFolder { name } => {
                let mut folders = view.dataset;
                let before = folders.len();
                folders.retain(|f| &f.name != name);
                if folders.len() == before {
                    return Err(CliError::not_found("dataset folder", name.clone()));
                }
                ctx.app.save_project(None, Some(folders.clone())).await?;
                print_output(ctx, folders.as_slice())
            }
            DatasetAction::Build { out } => {
                let path = ctx.app.build_dataset(out.clone()).await?;
                print_output(ctx, &PathOutput { path })
            }
            DatasetAction::Scan { .. } => Ok(()),
        }
    }
}
