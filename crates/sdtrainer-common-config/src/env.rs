//! Environment variable handling.

use std::env;

/// Environment variable names.
pub mod vars {
    pub const SDTRAINER_DATA_DIR: &str = "SDTRAINER_DATA_DIR";
    pub const SDTRAINER_REMOTE: &str = "SDTRAINER_REMOTE";
    pub const SDTRAINER_REMOTE_URL: &str = "SDTRAINER_REMOTE_URL";
    pub const SDTRAINER_CALLBACK_PORT: &str = "SDTRAINER_CALLBACK_PORT";
    pub const SDTRAINER_ENV: &str = "SDTRAINER_ENV";
    pub const SDTRAINER_LOG_LEVEL: &str = "SDTRAINER_LOG_LEVEL";
    pub const RUST_LOG: &str = "RUST_LOG";
}

/// Environment configuration.
pub struct Environment {
    _guard: (),
}

impl Environment {
    /// Initialize environment from .env files.
    pub fn init() -> Self {
        // Later files override earlier ones
        let _ = dotenvy::from_filename(".env");
        let _ = dotenvy::from_filename(".env.local");

        if let Ok(env) = env::var(vars::SDTRAINER_ENV) {
            let _ = dotenvy::from_filename(format!(".env.{}", env));
        }

        Self { _guard: () }
    }

    /// Get an optional string variable.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok()
    }

    /// Get a boolean variable.
    pub fn get_bool(var: &str) -> Option<bool> {
        env::var(var)
            .ok()
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
    }

    /// Whether operations should go to a remote service instead of local subprocesses.
    pub fn is_remote_mode() -> bool {
        Self::get_bool(vars::SDTRAINER_REMOTE).unwrap_or(false)
    }
}
