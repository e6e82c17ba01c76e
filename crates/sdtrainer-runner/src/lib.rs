//! Running the trainer repo's Python scripts.
//!
//! Scripts are launched with unbuffered output and report progress as one
//! JSON object per stdout line ([`protocol`]). Every long-running kind of
//! script is owned by a [`TaskSupervisor`] that runs at most one process at
//! a time and can interrupt the whole process tree.

pub mod args;
pub mod command;
pub mod error;
pub mod kill;
pub mod kind;
pub mod protocol;
pub mod supervisor;

pub use args::ScriptArgs;
pub use command::{resolve_python, ScriptCommand};
pub use error::{RunnerError, RunnerResult, SupervisorError};
pub use kill::{kill_process_tree, KillSignal};
pub use kind::TaskKind;
pub use protocol::{parse_line, ScriptEvent};
pub use supervisor::{TaskExit, TaskMessage, TaskRun, TaskState, TaskSupervisor};
