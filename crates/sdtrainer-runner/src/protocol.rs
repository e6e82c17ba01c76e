//! Line protocol spoken by the Python scripts on stdout.
//!
//! Each line is either one JSON object or free text. Which JSON shape is
//! expected depends on the task kind; a line that is JSON but does not fit
//! the shape for its kind is surfaced as [`ScriptEvent::Unrecognized`].

use crate::kind::TaskKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tracing::warn;

/// Stage reported by the preprocess script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessStage {
    PreprocessStart,
    ProcessProgress,
    PreprocessDone,
    StartDownloadModel,
    EndDownloadModel,
    DownloadModelProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessEvent {
    pub event: PreprocessStage,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub vars: Value,
}

/// One source image and the file preprocessing produced from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessPair {
    pub src: PathBuf,
    pub dest: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PreprocessEvent {
    /// Outputs listed by a `preprocess_done` event.
    pub fn outputs(&self) -> Option<Vec<PreprocessPair>> {
        if self.event != PreprocessStage::PreprocessDone {
            return None;
        }
        serde_json::from_value(self.vars.clone()).ok()
    }

    /// `(index, total)` of a `process_progress` event.
    pub fn progress(&self) -> Option<(u64, u64)> {
        if self.event != PreprocessStage::ProcessProgress {
            return None;
        }
        Some((self.vars.get("index")?.as_u64()?, self.vars.get("total")?.as_u64()?))
    }

    /// Percentage of a `download_model_progress` event.
    pub fn download_progress(&self) -> Option<f64> {
        if self.event != PreprocessStage::DownloadModelProgress {
            return None;
        }
        self.vars.get("progress")?.as_f64()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionTag {
    pub tag: String,
    pub rank: f64,
}

/// Tags found for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionOut {
    pub filename: PathBuf,
    pub tags: Vec<CaptionTag>,
}

/// Progress of the segmentation script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegOut {
    pub current: u64,
    pub total: u64,
    /// The input image.
    pub path: PathBuf,
    /// The segmented image written for it.
    pub output: PathBuf,
}

/// One image written by the generation script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGenerateOut {
    pub path: PathBuf,
    pub filename: PathBuf,
    #[serde(default)]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DoctorCheck {
    CheckPassed,
    CheckFailed,
    Message,
}

/// One line of the environment check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorOutput {
    pub message: String,
    pub level: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<DoctorCheck>,
}

/// A parsed stdout line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ScriptEvent {
    Preprocess(PreprocessEvent),
    Caption(CaptionOut),
    Segment(SegOut),
    Generate(ImageGenerateOut),
    Doctor(DoctorOutput),
    /// A status line carrying only a message.
    Status {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
    },
    /// The script reported a failure with `{"err": ...}`.
    Error { err: String },
    /// Free text, including anything that is not a JSON object.
    Log(String),
    /// JSON that does not fit the shape expected for the task kind.
    Unrecognized(Value),
}

impl ScriptEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, ScriptEvent::Error { .. })
    }
}

/// Parse one stdout line of a `kind` script.
pub fn parse_line(kind: TaskKind, line: &str) -> ScriptEvent {
    let trimmed = line.trim();
    if !kind.speaks_json() {
        return ScriptEvent::Log(trimmed.to_string());
    }
    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => value,
        _ => return ScriptEvent::Log(trimmed.to_string()),
    };

    if let Some(err) = value.get("err").filter(|e| !e.is_null()) {
        let err = match err {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return ScriptEvent::Error { err };
    }

    let typed = match kind {
        TaskKind::Preprocess => parse_preprocess(&value),
        TaskKind::Caption => serde_json::from_value(value.clone()).ok().map(ScriptEvent::Caption),
        TaskKind::Segment => vars(&value).map(ScriptEvent::Segment),
        TaskKind::Generate => vars(&value).map(ScriptEvent::Generate),
        TaskKind::Doctor => serde_json::from_value(value.clone()).ok().map(ScriptEvent::Doctor),
        TaskKind::Install => None,
    };
    if let Some(event) = typed {
        return event;
    }
    if let Some(message) = value.get("message").and_then(Value::as_str) {
        if value.get("vars").map_or(true, Value::is_null) {
            return ScriptEvent::Status {
                message: message.to_string(),
                event: value.get("event").and_then(Value::as_str).map(str::to_string),
            };
        }
    }
    warn!(kind = %kind, line = %trimmed, "script output does not match the expected shape");
    ScriptEvent::Unrecognized(value)
}

fn parse_preprocess(value: &Value) -> Option<ScriptEvent> {
    let event: PreprocessEvent = serde_json::from_value(value.clone()).ok()?;
    if event.event == PreprocessStage::PreprocessDone && event.outputs().is_none() {
        return None;
    }
    Some(ScriptEvent::Preprocess(event))
}

fn vars<T: serde::de::DeserializeOwned>(value: &Value) -> Option<T> {
    serde_json::from_value(value.get("vars")?.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn test_preprocess_done_lists_outputs() {
        let line = r#"{"event":"preprocess_done","message":"done","vars":[{"src":"/o/a.png","dest":"/p/a_0.png","name":"a_0.png"}]}"#;
        let ScriptEvent::Preprocess(event) = parse_line(TaskKind::Preprocess, line) else {
            panic!("expected preprocess event");
        };
        let outputs = event.outputs().unwrap();
        assert_eq!(outputs[0].dest, PathBuf::from("/p/a_0.png"));
        assert_eq!(outputs[0].name.as_deref(), Some("a_0.png"));
    }

    #[test]
    fn test_preprocess_progress() {
        let line = r#"{"event":"process_progress","message":"","vars":{"index":3,"total":10}}"#;
        let ScriptEvent::Preprocess(event) = parse_line(TaskKind::Preprocess, line) else {
            panic!("expected preprocess event");
        };
        assert_eq!(event.progress(), Some((3, 10)));
        assert_eq!(event.download_progress(), None);
    }

    #[test]
    fn test_malformed_done_is_unrecognized() {
        let line = r#"{"event":"preprocess_done","message":"done","vars":{"oops":1}}"#;
        assert!(matches!(parse_line(TaskKind::Preprocess, line), ScriptEvent::Unrecognized(_)));
    }

    #[test]
    fn test_caption_out() {
        let line = r#"{"filename":"/p/a.png","tags":[{"tag":"1girl","rank":0.98}]}"#;
        let event = parse_line(TaskKind::Caption, line);
        assert_eq!(
            event,
            ScriptEvent::Caption(CaptionOut {
                filename: "/p/a.png".into(),
                tags: vec![CaptionTag { tag: "1girl".into(), rank: 0.98 }],
            })
        );
    }

    #[test]
    fn test_segment_and_generate_use_vars() {
        let seg = r#"{"message":"seg","vars":{"current":1,"total":2,"path":"/p/a.png","output":"/p/a_seg.png"}}"#;
        match parse_line(TaskKind::Segment, seg) {
            ScriptEvent::Segment(out) => assert_eq!(out.output, PathBuf::from("/p/a_seg.png")),
            other => panic!("unexpected {other:?}"),
        }
        let gen = r#"{"message":"ok","vars":{"path":"/i/00001.png","filename":"00001.png","models":["m"]}}"#;
        match parse_line(TaskKind::Generate, gen) {
            ScriptEvent::Generate(out) => assert_eq!(out.models, vec!["m".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_doctor_output() {
        let line = r#"{"message":"torch ok","level":0,"event":"checkPassed"}"#;
        match parse_line(TaskKind::Doctor, line) {
            ScriptEvent::Doctor(out) => assert_eq!(out.event, Some(DoctorCheck::CheckPassed)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test_case(TaskKind::Caption, r#"{"err":"cuda oom"}"# ; "caption")]
    #[test_case(TaskKind::Generate, r#"{"message":"x","err":"bad model"}"# ; "generate")]
    fn test_err_field_wins(kind: TaskKind, line: &str) {
        assert!(parse_line(kind, line).is_error());
    }

    #[test_case("loading model..." ; "plain text")]
    #[test_case("42" ; "json scalar")]
    #[test_case("{\"event\": \"preprocess_st" ; "truncated json")]
    fn test_non_object_lines_are_logs(line: &str) {
        assert_eq!(parse_line(TaskKind::Preprocess, line), ScriptEvent::Log(line.to_string()));
    }

    #[test]
    fn test_message_only_is_status() {
        let event = parse_line(TaskKind::Generate, r#"{"message":"loading","event":"start"}"#);
        assert_eq!(
            event,
            ScriptEvent::Status { message: "loading".into(), event: Some("start".into()) }
        );
    }

    #[test]
    fn test_install_output_is_always_text() {
        let event = parse_line(TaskKind::Install, r#"{"err":"x"}"#);
        assert!(matches!(event, ScriptEvent::Log(_)));
    }

    #[test]
    fn test_event_serializes_tagged() {
        let json = serde_json::to_value(ScriptEvent::Error { err: "x".into() }).unwrap();
        assert_eq!(json, json!({"type": "error", "data": {"err": "x"}}));
        let json = serde_json::to_value(ScriptEvent::Log("hi".into())).unwrap();
        assert_eq!(json, json!({"type": "log", "data": "hi"}));
    }
}
