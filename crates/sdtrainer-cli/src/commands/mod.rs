//! Command implementations.

mod config;
mod dataset;
mod doctor;
mod generate;
mod images;
mod install;
mod log;
mod models;
mod project;
mod serve;
mod train;

pub use config::{ConfigCommand, SettingsCommand};
pub use dataset::DatasetCommand;
pub use doctor::DoctorCommand;
pub use generate::GenerateCommand;
pub use images::{CaptionCommand, CropCommand, DeleteImagesCommand, ImportCommand, PreprocessCommand, SegmentCommand};
pub use install::{InstallCommand, RepoCommand};
pub use log::LogCommand;
pub use models::ModelsCommand;
pub use project::ProjectCommand;
pub use serve::ServeCommand;
pub use train::TrainCommand;

use std::future::Future;

use sdtrainer_runner::{TaskExit, TaskKind};
use sdtrainer_service::{ServiceError, ServiceResult};
use tracing::warn;

use crate::cli::CommandContext;
use crate::error::CliError;
use crate::output::EventPrinter;

/// Await a supervised task while printing its events.
///
/// Ctrl-C interrupts the task of `kind` and waits for it to wind down.
pub(crate) async fn run_task<T, F>(ctx: &CommandContext, kind: TaskKind, task: F) -> Result<T, CliError>
where
    F: Future<Output = ServiceResult<T>>,
{
    let printer = EventPrinter::start(ctx.app.bus(), ctx.format);
    tokio::pin!(task);
    let result = tokio::select! {
        result = &mut task => result,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!(%kind, "interrupt requested");
            if let Err(e) = ctx.app.interrupt(kind).await {
                warn!(%kind, error = %e, "failed to interrupt task");
            }
            task.await
        }
    };
    printer.finish().await;
    Ok(result?)
}

/// A finished task that neither succeeded nor was interrupted is an error.
pub(crate) fn check_exit(exit: &TaskExit) -> Result<(), CliError> {
    if exit.success() || exit.interrupted {
        return Ok(());
    }
    Err(ServiceError::TaskFailed {
        kind: exit.kind,
        code: exit.code,
    }
    .into())
}

/// Parse `key=value`, reading the value as JSON when it parses and as a string otherwise.
pub(crate) fn parse_key_value(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(parse_key_value("epochs=10").unwrap(), ("epochs".into(), json!(10)));
        assert_eq!(parse_key_value("xformers=true").unwrap().1, json!(true));
        assert_eq!(parse_key_value("optimizer=AdamW8bit").unwrap().1, json!("AdamW8bit"));
        assert_eq!(parse_key_value("note=a=b").unwrap().1, json!("a=b"));
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=1").is_err());
    }
}
