//! Log command implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

use crate::cli::CommandContext;
use crate::error::CliError;
use crate::output::{print_output, PathOutput};

/// Application log file
#[derive(Debug, Parser)]
pub struct LogCommand {
    #[command(subcommand)]
    action: LogAction,
}

#[derive(Debug, Subcommand)]
enum LogAction {
    /// Print the path of the log file
    Path,

    /// Copy the log file into a directory
    Export {
        #[arg(value_hint = ValueHint::DirPath)]
        dir: PathBuf,
    },
}

impl LogCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        let path = match &self.action {
            LogAction::Path => ctx.app.paths().log_file(),
            LogAction::Export { dir } => ctx.app.export_log(dir)?,
        };
        print_output(ctx, &PathOutput { path })
    }
}
