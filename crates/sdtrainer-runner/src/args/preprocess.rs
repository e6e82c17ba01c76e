//! `preprocess_cli.py`: crop, resize, flip, and optionally caption images.

use super::{encode_json_arg, num, ScriptArgs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const PREPROCESS_SCRIPT: &str = "preprocess_cli.py";

/// Options for one preprocess run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreprocessConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folders: Option<Vec<PathBuf>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<PathBuf>>,
    pub dest_path: PathBuf,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub danbooru_caption: bool,
    pub clip_caption: bool,
    pub clip2_caption: bool,
    pub blip_caption: bool,
    pub wd_caption: bool,
    pub wd_general_threshold: Option<f64>,
    pub wd_model_name: Option<String>,
    pub flip: bool,
    pub face_focus: bool,
    pub focus_anime_face: bool,
    pub focus_anime_face_ratio: f64,
    pub focus_anime_body: bool,
    pub focus_anime_body_ratio: f64,
    pub focus_anime_half_body: bool,
    pub focus_anime_half_body_ratio: f64,
    pub focus_to_top: bool,
}

#[derive(Serialize)]
struct Input<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    folders: Option<&'a Vec<PathBuf>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<&'a Vec<PathBuf>>,
}

impl ScriptArgs for PreprocessConfig {
    fn script(&self) -> &'static str {
        PREPROCESS_SCRIPT
    }

    fn to_args(&self) -> Vec<String> {
        let input = Input {
            folders: self.folders.as_ref(),
            files: self.files.as_ref(),
        };
        let mut args = vec![
            "--json_out".to_string(),
            "--json_input_base64".to_string(),
            encode_json_arg(&input),
            "--dest".to_string(),
            self.dest_path.display().to_string(),
            "--output_detail".to_string(),
        ];
        if let Some(width) = self.width.filter(|w| *w > 0) {
            args.extend(["--width".to_string(), width.to_string()]);
        }
        if let Some(height) = self.height.filter(|h| *h > 0) {
            args.extend(["--height".to_string(), height.to_string()]);
        }
        if self.danbooru_caption {
            args.push("--caption_deepbooru".to_string());
        }
        if self.clip_caption {
            args.push("--caption_clip".to_string());
        }
        if self.blip_caption {
            args.push("--caption".to_string());
        }
        if self.wd_caption {
            args.push("--caption_wd".to_string());
            if let Some(model) = self.wd_model_name.as_ref().filter(|m| !m.is_empty()) {
                args.extend(["--wd_model_name".to_string(), model.clone()]);
            }
            if let Some(threshold) = self.wd_general_threshold.filter(|t| *t != 0.0) {
                args.extend(["--wd_general_threshold".to_string(), num(threshold)]);
            }
        }
        if self.clip2_caption {
            args.push("--caption_clip2".to_string());
        }
        if self.face_focus {
            args.push("--focal_crop".to_string());
        }
        if self.focus_anime_face {
            args.extend([
                "--anime_face".to_string(),
                "--anime_face_ratio".to_string(),
                num(self.focus_anime_face_ratio),
            ]);
        }
        if self.focus_anime_body {
            args.extend([
                "--anime_person".to_string(),
                "--anime_person_ratio".to_string(),
                num(self.focus_anime_body_ratio),
            ]);
        }
        if self.focus_anime_half_body {
            args.extend([
                "--anime_half".to_string(),
                "--anime_half_ratio".to_string(),
                num(self.focus_anime_half_body_ratio),
            ]);
        }
        if self.focus_to_top {
            args.push("--to_anime_body_top".to_string());
        }
        if self.flip {
            args.push("--flip".to_string());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::decode_json_arg;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn test_minimal_args() {
        let config = PreprocessConfig {
            files: Some(vec!["/o/a.png".into()]),
            dest_path: "/p/preprocess".into(),
            ..Default::default()
        };
        let args = config.to_args();
        assert_eq!(args[0], "--json_out");
        assert_eq!(decode_json_arg(&args[2]), json!({"files": ["/o/a.png"]}));
        assert_eq!(&args[3..], ["--dest", "/p/preprocess", "--output_detail"]);
    }

    #[test]
    fn test_all_options() {
        let config: PreprocessConfig = serde_json::from_value(json!({
            "folders": ["/in"],
            "destPath": "/out",
            "width": 512,
            "height": 768,
            "wdCaption": true,
            "wdModelName": "wd-v1-4-vit",
            "wdGeneralThreshold": 0.35,
            "clip2Caption": true,
            "focusAnimeFace": true,
            "focusAnimeFaceRatio": 1.5,
            "focusToTop": true,
            "flip": true
        }))
        .unwrap();
        let args = config.to_args();
        let tail = args[6..].join(" ");
        assert_eq!(
            tail,
            "--width 512 --height 768 --caption_wd --wd_model_name wd-v1-4-vit \
             --wd_general_threshold 0.35 --caption_clip2 --anime_face --anime_face_ratio 1.5 \
             --to_anime_body_top --flip"
        );
    }

    #[test]
    fn test_wd_options_need_wd_caption() {
        let config = PreprocessConfig {
            wd_model_name: Some("m".into()),
            wd_general_threshold: Some(0.5),
            ..Default::default()
        };
        assert!(!config.to_args().iter().any(|a| a.starts_with("--wd")));
    }

    #[test]
    fn test_command_runs_from_repo() {
        let config = PreprocessConfig::default();
        let cmd = config.command(Path::new("/repo"), Path::new("/repo/venv/bin/python"));
        assert_eq!(cmd.cwd.as_deref(), Some(Path::new("/repo")));
        assert_eq!(cmd.args[1], Path::new("/repo").join(PREPROCESS_SCRIPT).display().to_string());
    }
}
