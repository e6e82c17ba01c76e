//! Configuration for sdtrainer.
//!
//! Settings live in a flat JSON key-value file under the application data
//! directory. Well-known keys have typed accessors; any other key can be read
//! and written as raw JSON.

pub mod env;
pub mod paths;
pub mod presets;
pub mod store;
pub mod types;

pub use env::*;
pub use paths::AppPaths;
pub use presets::{builtin_presets, default_preset, upsert_preset, DEFAULT_PRESET_NAME};
pub use store::{ConfigError, SettingsStore};
pub use types::*;
