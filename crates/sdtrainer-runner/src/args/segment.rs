//! `aniseg_cli.py`: cut anime characters out of their backgrounds.

use super::{encode_json_arg, ScriptArgs};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;

pub const SEGMENT_SCRIPT: &str = "aniseg_cli.py";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmentConfig {
    pub image_paths: Vec<PathBuf>,
    /// Directory the segmented images are written to.
    pub out: PathBuf,
}

impl ScriptArgs for SegmentConfig {
    fn script(&self) -> &'static str {
        SEGMENT_SCRIPT
    }

    fn to_args(&self) -> Vec<String> {
        vec![
            "--json_out".to_string(),
            "--json_input_base64".to_string(),
            encode_json_arg(&json!({ "files": self.image_paths })),
            "--out".to_string(),
            self.out.display().to_string(),
        ]
    }
}
