//! Generate command implementation.

use std::path::PathBuf;

use clap::{Parser, ValueHint};
use sdtrainer_runner::TaskKind;
use sdtrainer_service::LoraImageRequest;
use serde_json::{Map, Value};

use super::{check_exit, parse_key_value, run_task};
use crate::cli::CommandContext;
use crate::error::CliError;

/// Render a preview image with a trained model
#[derive(Debug, Parser)]
pub struct GenerateCommand {
    /// LoRA model file; without one only the base model is used
    #[arg(value_hint = ValueHint::FilePath)]
    model: Option<PathBuf>,

    /// LoRA multiplier
    #[arg(long)]
    weight: Option<f64>,

    /// Text-to-image options as a JSON file; defaults to the saved preview options
    #[arg(long, value_hint = ValueHint::FilePath)]
    props: Option<PathBuf>,

    /// Override one option, e.g. `--set steps=30 --set prompt="1girl"`
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    overrides: Vec<(String, Value)>,

    /// Store the resulting options as the project's preview options
    #[arg(long)]
    save_props: bool,
}

impl GenerateCommand {
    async fn resolve_props(&self, ctx: &CommandContext) -> Result<Option<Value>, CliError> {
        let base = match &self.props {
            Some(path) => Some(serde_json::from_str::<Value>(&std::fs::read_to_string(path)?)?),
            None if self.overrides.is_empty() => return Ok(None),
            None => ctx.app.preview_props().await?,
        };
        let mut props = match base {
            Some(Value::Object(map)) => map,
            Some(_) => return Err(CliError::validation("preview options must be a JSON object")),
            None => Map::new(),
        };
        for (key, value) in &self.overrides {
            props.insert(key.clone(), value.clone());
        }
        Ok(Some(Value::Object(props)))
    }

    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        ctx.open_project().await?;
        let props = self.resolve_props(ctx).await?;
        if self.save_props {
            if let Some(props) = &props {
                ctx.app.save_preview_props(props.clone()).await?;
            }
        }
        let request = LoraImageRequest {
            lora_model_path: self.model.clone(),
            props,
            lora: self.weight,
        };
        let exit = run_task(ctx, TaskKind::Generate, ctx.app.generate_lora_image(request)).await?;
        check_exit(&exit)
    }
}
