//! sdtrainer CLI - LoRA training workbench
//!
//! Main entry point for the `sdtrainer` binary.

use std::process::ExitCode;

use clap::Parser;
use sdtrainer_common_config::{vars, Environment};
use sdtrainer_common_log::{LogConfig, LogLevel};
use tracing::error;

use sdtrainer_cli::cli::Cli;
use sdtrainer_cli::error::CliError;

/// Application exit codes
#[repr(u8)]
pub enum Exit {
    Success = 0,
    GeneralError = 1,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

fn main() -> ExitCode {
    // .env files may carry SDTRAINER_* settings read by clap
    let _env = Environment::init();
    let cli = Cli::parse();

    let logging = init_logging(&cli);
    if let Err(e) = &logging {
        eprintln!("warning: {e}");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to create Tokio runtime: {e}");
            return Exit::GeneralError.into();
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => Exit::Success.into(),
        Err(e) => {
            if logging.is_ok() {
                error!(code = e.code(), "{e}");
            } else {
                eprintln!("error[{}]: {e}", e.code());
            }
            if let Some(hint) = e.hint() {
                eprintln!("hint: {hint}");
            }
            e.exit_code()
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    cli.execute().await
}

/// Stderr gets the `-v`/`-q` level unless a level comes from the environment.
fn init_logging(cli: &Cli) -> Result<(), sdtrainer_common_log::LogError> {
    let mut config = LogConfig::from_env().with_file(cli.app_paths().log_file());
    let level_from_env =
        Environment::get(vars::SDTRAINER_LOG_LEVEL).is_some() || Environment::get(vars::RUST_LOG).is_some();
    if cli.verbose > 0 || cli.quiet || !level_from_env {
        config.level = LogLevel::from_verbosity(cli.verbose, cli.quiet);
        config.directives = None;
    }
    sdtrainer_common_log::init(config)
}
