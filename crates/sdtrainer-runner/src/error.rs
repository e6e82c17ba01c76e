//! Runner error types.

use crate::kind::TaskKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from spawning and controlling script processes.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The process could not be started.
    #[error("failed to spawn {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required setting is missing (repo path, interpreter, ...).
    #[error("{what} is not configured")]
    NotConfigured { what: String },

    /// A stdio pipe was not available after spawn.
    #[error("child process has no {stream} pipe")]
    MissingPipe { stream: &'static str },

    /// Signalling the process tree failed.
    #[error("failed to signal process {pid}: {message}")]
    Kill { pid: u32, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the single-slot task supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A task of this kind is already in flight.
    #[error("a {kind} task is already running")]
    AlreadyRunning { kind: TaskKind },

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

pub type RunnerResult<T> = Result<T, RunnerError>;
