//! Argument builders for the trainer repo scripts.

pub mod caption;
pub mod doctor;
pub mod generate;
pub mod preprocess;
pub mod segment;
pub mod setup;
pub mod train;

pub use caption::{CaptionConfig, Tagger};
pub use doctor::DoctorRequest;
pub use generate::{GenerateRequest, Text2ImageOptions};
pub use preprocess::PreprocessConfig;
pub use segment::SegmentConfig;
pub use setup::SetupScript;
pub use train::{TrainCommand, TrainingConfig, TerminalPlatform};

use crate::command::ScriptCommand;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::path::Path;

/// A script in the repo together with the arguments for one run.
pub trait ScriptArgs {
    /// File name of the script, relative to the repo root.
    fn script(&self) -> &'static str;

    fn to_args(&self) -> Vec<String>;

    /// `python -u <repo>/<script> <args>` run from the repo root.
    fn command(&self, repo: &Path, python: &Path) -> ScriptCommand {
        ScriptCommand::python(python, repo.join(self.script()))
            .args(self.to_args())
            .current_dir(repo)
    }
}

/// Base64 of the compact JSON form of `value`, as taken by `--json_input_base64`.
pub fn encode_json_arg<T: Serialize>(value: &T) -> String {
    // Serializing plain structs and maps cannot fail
    let json = serde_json::to_vec(value).unwrap_or_default();
    STANDARD.encode(json)
}

/// Format a number the way the scripts' argparse expects it: `1` rather than `1.0`.
pub(crate) fn num(value: f64) -> String {
    value.to_string()
}

#[cfg(test)]
pub(crate) fn decode_json_arg(arg: &str) -> serde_json::Value {
    let bytes = STANDARD.decode(arg).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_json_arg() {
        let arg = encode_json_arg(&json!({"files": ["/a.png"]}));
        assert_eq!(decode_json_arg(&arg), json!({"files": ["/a.png"]}));
    }

    #[test]
    fn test_num_drops_trailing_zero() {
        assert_eq!(num(1.0), "1");
        assert_eq!(num(0.35), "0.35");
    }
}
