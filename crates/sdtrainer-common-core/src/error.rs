//! Error types shared by the sdtrainer crates.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// The main error type for low-level sdtrainer operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Generic error with custom message.
    #[error("{0}")]
    Generic(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system error with the offending path.
    #[error("{message}")]
    FileSystem {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a new generic error.
    pub fn new(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a file system error for `path`.
    pub fn fs(message: impl Into<String>, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::FileSystem {
            message: message.into(),
            path: Some(path.as_ref().to_path_buf()),
            source: Some(source),
        }
    }

    /// Whether the underlying cause is a missing file.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::FileSystem {
                source: Some(e), ..
            }
            | Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type alias using sdtrainer's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_error_keeps_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::fs("failed to read file", "/tmp/missing.png", io);
        match &err {
            Error::FileSystem { path, .. } => {
                assert_eq!(path.as_deref(), Some(Path::new("/tmp/missing.png")))
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "failed to read file");
    }

    #[test]
    fn test_generic_is_not_not_found() {
        assert!(!Error::new("boom").is_not_found());
    }

    #[test]
    fn test_from_serde_json() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
