//! Operations front ends invoke on an [`AppContext`](crate::AppContext).
//!
//! Script-backed flows start a run under the kind's supervisor, turn its
//! output into [`UiEvent`](crate::UiEvent)s while applying side effects to the
//! open project, and return the exit once the process is gone.

pub mod callback;
pub mod caption;
pub mod doctor;
pub mod generate;
pub mod install;
pub mod library;
pub mod preprocess;
pub mod project;
pub mod segment;
pub mod training;

use crate::error::{ServiceError, ServiceResult};
use sdtrainer_runner::{TaskExit, TaskKind};

/// The exit of a drained run. The monitor always reports one unless it was torn down.
pub(crate) fn require_exit(kind: TaskKind, exit: Option<TaskExit>) -> ServiceResult<TaskExit> {
    exit.ok_or_else(|| ServiceError::Join(format!("{kind} monitor ended without an exit status")))
}
