//! `gen_img_diffusers.py`: render preview images with a trained LoRA.

use super::{num, ScriptArgs};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const GENERATE_SCRIPT: &str = "gen_img_diffusers.py";

/// Upper bound (exclusive) of randomly drawn seeds.
const RANDOM_SEED_RANGE: u64 = 100_000_000;

/// Text-to-image options as stored in the project's preview props.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Text2ImageOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdmodel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(rename = "randomSeed")]
    pub random_seed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampler_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_iter: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Text2ImageOptions {
    /// The prompt argument: `<prompt> --n <negative>`.
    pub fn full_prompt(&self) -> String {
        let mut prompt = self.prompt.clone().unwrap_or_default();
        if let Some(negative) = self.negative_prompt.as_ref().filter(|n| !n.is_empty()) {
            prompt.push_str(" --n ");
            prompt.push_str(negative);
        }
        prompt
    }
}

/// One preview generation for a model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateRequest {
    pub options: Text2ImageOptions,
    /// LoRA weights; no weights renders the base model only.
    pub lora_model_path: Option<PathBuf>,
    /// Network multiplier.
    pub lora: Option<f64>,
    pub outdir: PathBuf,
}

impl GenerateRequest {
    /// Seed passed to the script, drawing a fresh one when `randomSeed` is set.
    fn seed(&self) -> Option<u64> {
        let seed = self.options.seed.filter(|s| *s != 0)?;
        if self.options.random_seed {
            Some(rand::thread_rng().gen_range(0..RANDOM_SEED_RANGE))
        } else {
            Some(seed)
        }
    }
}

impl ScriptArgs for GenerateRequest {
    fn script(&self) -> &'static str {
        GENERATE_SCRIPT
    }

    fn to_args(&self) -> Vec<String> {
        let options = &self.options;
        let mut args = vec![
            "--json_out".to_string(),
            "--outdir".to_string(),
            self.outdir.display().to_string(),
            "--prompt".to_string(),
            options.full_prompt(),
        ];
        let mut opt = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                args.push(name.to_string());
                args.push(value);
            }
        };
        opt("--ckpt", options.sdmodel.clone().filter(|m| !m.is_empty()));
        opt("--W", options.width.filter(|w| *w > 0).map(|w| w.to_string()));
        opt("--H", options.height.filter(|h| *h > 0).map(|h| h.to_string()));
        opt("--steps", options.steps.filter(|s| *s > 0).map(|s| s.to_string()));
        opt("--seed", self.seed().map(|s| s.to_string()));
        opt("--sampler", options.sampler_name.clone().filter(|s| !s.is_empty()));
        opt("--batch_size", options.batch_size.filter(|b| *b > 0).map(|b| b.to_string()));
        opt("--n_iter", options.n_iter.filter(|n| *n > 0).map(|n| n.to_string()));
        opt("--network_mul", self.lora.filter(|l| *l != 0.0).map(num));
        if let Some(weights) = &self.lora_model_path {
            args.extend([
                "--network_module".to_string(),
                "networks.lora".to_string(),
                "--network_weights".to_string(),
                weights.display().to_string(),
            ]);
        }
        args
    }
}
