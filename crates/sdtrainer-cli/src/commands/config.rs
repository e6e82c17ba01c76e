//! Config and settings command implementations.

use clap::{Parser, Subcommand};
use sdtrainer_common_config::TrainerSettings;
use serde_json::{Map, Value};
use tracing::info;

use crate::cli::CommandContext;
use crate::error::CliError;
use crate::output::print_output;

/// Keys of the `trainer_setting` object.
pub const SETTING_KEYS: &[&str] = &[
    "proxy",
    "sdwPath",
    "sdwPort",
    "sdwModelPath",
    "loraScriptInstallWithCn",
    "loraScriptCnRepo",
    "previewXformers",
    "gitPath",
    "trainerPythonPath",
];

/// Read and write raw settings keys
#[derive(Debug, Parser)]
pub struct ConfigCommand {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the JSON stored under a key
    Get { key: String },

    /// Store a JSON value under a key
    Set {
        key: String,
        /// JSON value; anything that is not valid JSON is stored as a string
        value: String,
    },

    /// Remove a key
    Unset { key: String },
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        match &self.action {
            ConfigAction::Get { key } => {
                let value = ctx
                    .app
                    .read_config(key)
                    .ok_or_else(|| CliError::not_found("config key", key.clone()))?;
                print_output(ctx, &value)
            }
            ConfigAction::Set { key, value } => {
                ctx.app.save_config(key, parse_value(value))?;
                info!(%key, "config saved");
                Ok(())
            }
            ConfigAction::Unset { key } => {
                ctx.app
                    .settings()
                    .remove(key)?
                    .ok_or_else(|| CliError::not_found("config key", key.clone()))?;
                Ok(())
            }
        }
    }
}

/// Show and change trainer settings
#[derive(Debug, Parser)]
pub struct SettingsCommand {
    #[command(subcommand)]
    action: Option<SettingsAction>,
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    /// Print the trainer settings
    Show,

    /// Change one setting, e.g. `settings set proxy http://127.0.0.1:7890`
    Set { key: String, value: String },

    /// Clear one setting
    Unset { key: String },
}

fn check_key(key: &str) -> Result<(), CliError> {
    if SETTING_KEYS.contains(&key) {
        return Ok(());
    }
    Err(CliError::validation(format!(
        "unknown setting `{key}`; expected one of: {}",
        SETTING_KEYS.join(", ")
    )))
}

/// `settings` with `key` set to `raw`, read as JSON first and as a string when that does not fit.
fn apply_setting(settings: &TrainerSettings, key: &str, raw: &str) -> Result<TrainerSettings, CliError> {
    check_key(key)?;
    let mut map = match serde_json::to_value(settings)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for candidate in [parse_value(raw), Value::String(raw.to_string())] {
        map.insert(key.to_string(), candidate);
        if let Ok(updated) = serde_json::from_value(Value::Object(map.clone())) {
            return Ok(updated);
        }
    }
    Err(CliError::validation(format!("invalid value for `{key}`: {raw}")))
}

fn clear_setting(settings: &TrainerSettings, key: &str) -> Result<TrainerSettings, CliError> {
    check_key(key)?;
    let mut map = match serde_json::to_value(settings)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.remove(key);
    Ok(serde_json::from_value(Value::Object(map))?)
}

impl SettingsCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        let current = ctx.app.trainer_settings()?;
        let updated = match &self.action {
            None | Some(SettingsAction::Show) => return print_output(ctx, &current),
            Some(SettingsAction::Set { key, value }) => apply_setting(&current, key, value)?,
            Some(SettingsAction::Unset { key }) => clear_setting(&current, key)?,
        };
        ctx.app.save_trainer_settings(&updated)?;
        info!("trainer settings saved");
        print_output(ctx, &updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_setting_types() {
        let settings = TrainerSettings::default();
        let updated = apply_setting(&settings, "sdwPort", "7860").unwrap();
        assert_eq!(updated.sdw_port.as_deref(), Some("7860"));
        let updated = apply_setting(&updated, "loraScriptCnRepo", "true").unwrap();
        assert_eq!(updated.lora_script_cn_repo, Some(true));
        assert!(apply_setting(&updated, "previewXformers", "maybe").is_err());
        assert!(matches!(
            apply_setting(&updated, "sdw_port", "1"),
            Err(CliError::Validation { .. })
        ));
    }

    #[test]
    fn test_clear_setting() {
        let settings = TrainerSettings {
            proxy: Some("http://proxy".into()),
            ..Default::default()
        };
        assert_eq!(clear_setting(&settings, "proxy").unwrap(), TrainerSettings::default());
    }
}
