//! Doctor command implementation.

use clap::Parser;
use sdtrainer_runner::protocol::DoctorCheck;
use sdtrainer_service::{DoctorReport, ServiceError};

use crate::cli::CommandContext;
use crate::error::CliError;
use crate::output::{print_output, FormattedOutput};

/// Check the Python environment of the script repository
#[derive(Debug, Parser)]
pub struct DoctorCommand {}

impl FormattedOutput for DoctorReport {
    fn format_text(&self) -> String {
        let mut lines: Vec<String> = self
            .checks
            .iter()
            .map(|check| {
                let mark = match check.event {
                    Some(DoctorCheck::CheckPassed) => "ok  ",
                    Some(DoctorCheck::CheckFailed) => "FAIL",
                    _ => "    ",
                };
                format!("{mark} {}", check.message)
            })
            .collect();
        lines.push(String::new());
        lines.push(if self.passed() {
            "All checks passed.".to_string()
        } else {
            "Some checks failed.".to_string()
        });
        lines.join("\n")
    }
}

impl DoctorCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        let report = ctx.app.doctor().await?;
        print_output(ctx, &report)?;
        if report.passed() {
            return Ok(());
        }
        Err(ServiceError::TaskFailed {
            kind: report.exit.kind,
            code: report.exit.code,
        }
        .into())
    }
}
