//! Environment check of the script repository.

use super::require_exit;
use crate::context::AppContext;
use crate::error::ServiceResult;
use crate::events::UiEvent;
use sdtrainer_runner::args::DoctorRequest;
use sdtrainer_runner::protocol::{DoctorCheck, DoctorOutput};
use sdtrainer_runner::{ScriptEvent, TaskExit, TaskKind, TaskMessage};
use serde::Serialize;
use tracing::{info, instrument};

/// Everything `doctor_cli.py` reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorReport {
    pub checks: Vec<DoctorOutput>,
    pub exit: TaskExit,
}

impl DoctorReport {
    /// The script exited cleanly and no check failed.
    pub fn passed(&self) -> bool {
        self.exit.success()
            && !self
                .checks
                .iter()
                .any(|c| c.event == Some(DoctorCheck::CheckFailed))
    }
}

impl AppContext {
    #[instrument(skip_all)]
    pub async fn doctor(&self) -> ServiceResult<DoctorReport> {
        let command = self.script_command(&DoctorRequest)?;
        let mut run = self.supervisor(TaskKind::Doctor).start(&command)?;
        info!(pid = run.pid, "start doctor check");

        let mut checks = Vec::new();
        let mut exit = None;
        while let Some(message) = run.next().await {
            match message {
                TaskMessage::Event(ScriptEvent::Doctor(out)) => {
                    self.emit(UiEvent::DoctorResult(out.clone()));
                    checks.push(out);
                }
                TaskMessage::Event(_) => {}
                TaskMessage::Stderr(line) => self.emit(UiEvent::TaskStderr {
                    kind: TaskKind::Doctor,
                    line,
                }),
                TaskMessage::Exit(status) => {
                    self.emit(UiEvent::TaskExit(status.clone()));
                    exit = Some(status);
                }
            }
        }
        Ok(DoctorReport {
            checks,
            exit: require_exit(TaskKind::Doctor, exit)?,
        })
    }
}
