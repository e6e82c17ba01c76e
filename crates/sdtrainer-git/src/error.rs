//! Git error types.

use thiserror::Error;

/// Git operation error.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not a git repository.
    #[error("not a git repository: {path}")]
    NotARepo { path: String },

    /// Remote not found.
    #[error("remote not found: {name}")]
    RemoteNotFound { name: String },

    /// The local branch has diverged from the remote.
    #[error("cannot fast-forward {branch}: local history has diverged")]
    Diverged { branch: String },

    /// Invalid operation.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// Git2 library error.
    #[error("git error: {0}")]
    Git2(#[from] git2::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Git operations.
pub type GitResult<T> = Result<T, GitError>;

impl GitError {
    /// Check if this is a network-related error.
    pub fn is_network_error(&self) -> bool {
        match self {
            Self::Git2(e) => matches!(e.class(), git2::ErrorClass::Net | git2::ErrorClass::Http),
            _ => false,
        }
    }
}
