//! Project error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading, reconciling, or mutating a project.
#[derive(Debug, Error)]
pub enum ProjectError {
    /// File system failure from the shared helpers.
    #[error(transparent)]
    Fs(#[from] sdtrainer_common_core::Error),

    /// Raw I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `project.json` does not have the expected shape.
    #[error("invalid project metadata at {path}: {message}")]
    InvalidMeta { path: PathBuf, message: String },

    /// An image could not be decoded or encoded.
    #[error("image error for {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A data URL was malformed.
    #[error("invalid image data: {message}")]
    InvalidDataUrl { message: String },

    /// A source file referenced by an operation does not exist.
    #[error("source not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// A project already exists at the target path.
    #[error("project already exists at {path}")]
    AlreadyExists { path: PathBuf },

    /// The store worker has shut down.
    #[error("project store is closed")]
    StoreClosed,

    /// No project is currently open.
    #[error("no project is open")]
    NotOpen,
}

impl ProjectError {
    pub(crate) fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }
}

/// Result type for project operations.
pub type ProjectResult<T> = Result<T, ProjectError>;
