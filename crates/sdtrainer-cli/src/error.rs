//! CLI error handling.

use std::io;
use std::process::ExitCode;

use sdtrainer_service::ServiceError;
use thiserror::Error;

/// CLI error type with exit codes and hints.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        hint: Option<String>,
    },

    #[error("{message}")]
    Io {
        message: String,
        #[source]
        source: io::Error,
    },

    #[error("{message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    NotFound {
        message: String,
        resource_type: String,
        resource_name: String,
    },

    /// A script or terminal run failed.
    #[error("{message}")]
    Task {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{message}")]
    User { message: String, hint: Option<String> },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "E001",
            Self::Io { .. } => "E002",
            Self::Network { .. } => "E003",
            Self::Validation { .. } => "E004",
            Self::NotFound { .. } => "E005",
            Self::Task { .. } => "E007",
            Self::User { .. } => "E010",
            Self::Other(_) => "E999",
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        let code = match self {
            Self::Config { .. } => 2,
            Self::Io { .. } => 3,
            Self::Network { .. } => 4,
            Self::Validation { .. } => 5,
            Self::NotFound { .. } => 6,
            Self::Task { .. } => 8,
            Self::User { .. } => 1,
            Self::Other(_) => 1,
        };
        ExitCode::from(code)
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Config { hint, .. } | Self::User { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }

    pub fn config_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
            hint: Some(hint.into()),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(resource_type: impl Into<String>, resource_name: impl Into<String>) -> Self {
        let resource_type = resource_type.into();
        let resource_name = resource_name.into();
        Self::NotFound {
            message: format!("{resource_type} not found: {resource_name}"),
            resource_type,
            resource_name,
        }
    }

    pub fn user_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation(format!("Invalid JSON: {err}"))
    }
}

impl From<sdtrainer_common_config::ConfigError> for CliError {
    fn from(err: sdtrainer_common_config::ConfigError) -> Self {
        Self::Config {
            message: format!("Configuration error: {err}"),
            source: Some(Box::new(err)),
            hint: Some("Check settings.json in the data directory".to_string()),
        }
    }
}

impl From<sdtrainer_common_core::Error> for CliError {
    fn from(err: sdtrainer_common_core::Error) -> Self {
        match err {
            sdtrainer_common_core::Error::Io(e) => e.into(),
            sdtrainer_common_core::Error::Config(message) => Self::Config {
                message,
                source: None,
                hint: None,
            },
            other => Self::Other(other.into()),
        }
    }
}

impl From<ServiceError> for CliError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NoProject => Self::user_with_hint(
                "no project is open",
                "pass --project <dir> or create one with `sdtrainer project new`",
            ),
            ServiceError::NotConfigured { what } => Self::config_with_hint(
                format!("{what} is not configured"),
                "run `sdtrainer install` or point the repo settings at an existing install",
            ),
            ServiceError::InvalidRequest(message) => Self::validation(message),
            ServiceError::Config(e) => e.into(),
            ServiceError::Io(e) => e.into(),
            ServiceError::Git(e) if e.is_network_error() => Self::Network {
                message: e.to_string(),
                source: Some(Box::new(e)),
            },
            e @ (ServiceError::Http(_) | ServiceError::Remote { .. }) => Self::Network {
                message: e.to_string(),
                source: Some(Box::new(e)),
            },
            e @ (ServiceError::TaskFailed { .. }
            | ServiceError::Runner(_)
            | ServiceError::Supervisor(_)
            | ServiceError::Git(_)) => Self::Task {
                message: e.to_string(),
                source: Some(Box::new(e)),
            },
            other => Self::Other(other.into()),
        }
    }
}
