//! Tagger scripts that write one caption result per image.

use super::{encode_json_arg, num, ScriptArgs};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;

/// Which tagging model to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tagger {
    #[default]
    Deepbooru,
    Clip,
    Wd14,
    Clip2,
    Blip,
}

impl Tagger {
    pub fn script(&self) -> &'static str {
        match self {
            Tagger::Deepbooru => "deepbooru_cli.py",
            Tagger::Clip => "clip_cli.py",
            Tagger::Wd14 => "wd14_cli.py",
            Tagger::Clip2 => "clip_cli2.py",
            Tagger::Blip => "blip_cli.py",
        }
    }
}

/// A caption run over explicit image files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    #[serde(rename = "imagePaths")]
    pub image_paths: Vec<PathBuf>,
    pub tagger: Tagger,
    /// Recorded in caption history to tell runs with different settings apart.
    #[serde(rename = "taggerId")]
    pub tagger_id: String,
    /// Deepbooru only.
    pub threshold: Option<f64>,
    /// WD14 only.
    pub general_threshold: Option<f64>,
    /// WD14 only.
    pub model: Option<String>,
}

impl ScriptArgs for CaptionConfig {
    fn script(&self) -> &'static str {
        self.tagger.script()
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--input_base64".to_string(),
            encode_json_arg(&json!({ "files": self.image_paths })),
            "--per".to_string(),
            "--with_rank".to_string(),
            "--no_result".to_string(),
        ];
        match self.tagger {
            Tagger::Deepbooru => {
                if let Some(threshold) = self.threshold.filter(|t| *t != 0.0) {
                    args.extend(["--threshold".to_string(), num(threshold)]);
                }
            }
            Tagger::Wd14 => {
                if let Some(threshold) = self.general_threshold.filter(|t| *t != 0.0) {
                    args.extend(["--general_threshold".to_string(), num(threshold)]);
                }
                if let Some(model) = self.model.as_ref().filter(|m| !m.is_empty()) {
                    args.extend(["--model".to_string(), model.clone()]);
                }
            }
            Tagger::Clip | Tagger::Clip2 | Tagger::Blip => {}
        }
        args
    }
}
