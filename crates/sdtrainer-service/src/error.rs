//! Service error types.

use sdtrainer_runner::TaskKind;
use thiserror::Error;

/// Errors surfaced by the application flows and backends.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no project is open")]
    NoProject,

    /// A setting the operation depends on is empty.
    #[error("{what} is not configured")]
    NotConfigured { what: String },

    #[error(transparent)]
    Project(#[from] sdtrainer_project::ProjectError),

    #[error(transparent)]
    Runner(#[from] sdtrainer_runner::RunnerError),

    #[error(transparent)]
    Supervisor(#[from] sdtrainer_runner::SupervisorError),

    #[error(transparent)]
    Git(#[from] sdtrainer_git::GitError),

    #[error(transparent)]
    Config(#[from] sdtrainer_common_config::ConfigError),

    #[error(transparent)]
    Fs(#[from] sdtrainer_common_core::Error),

    #[error(transparent)]
    Http(#[from] sdtrainer_common_http::HttpError),

    #[error(transparent)]
    Server(#[from] sdtrainer_server::ServerError),

    #[error(transparent)]
    Log(#[from] sdtrainer_common_log::LogError),

    /// A script run finished unsuccessfully.
    #[error("{kind} exited with {}", code.map(|c| c.to_string()).unwrap_or_else(|| "a signal".to_string()))]
    TaskFailed { kind: TaskKind, code: Option<i32> },

    /// Caller-supplied input has the wrong shape.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The remote service answered with `result != "success"` or no data.
    #[error("remote service error: {message}")]
    Remote { message: String },

    /// A blocking job panicked or was cancelled.
    #[error("background job failed: {0}")]
    Join(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(e: tokio::task::JoinError) -> Self {
        ServiceError::Join(e.to_string())
    }
}

impl ServiceError {
    pub fn not_configured(what: impl Into<String>) -> Self {
        ServiceError::NotConfigured { what: what.into() }
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
