//! Output formatting for command results and bus events.

use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

use sdtrainer_common_config::{LoraPreset, TrainerSettings};
use sdtrainer_project::{DatasetFolder, LoraModel, OriginalView, PreprocessItem, ProjectView, TrainConfig};
use sdtrainer_runner::protocol::PreprocessStage;
use sdtrainer_runner::{ScriptEvent, TaskExit};
use sdtrainer_service::{EventBus, ModelFile, RecentProject, SavedProject, UiEvent};

use crate::cli::{CommandContext, OutputFormat};
use crate::error::CliError;

/// Types that can be printed as text or JSON.
pub trait FormattedOutput: Serialize {
    fn format_text(&self) -> String;

    fn format_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Print a command result to stdout in the selected format.
pub fn print_output<T>(ctx: &CommandContext, value: &T) -> Result<(), CliError>
where
    T: FormattedOutput + ?Sized,
{
    let output = match ctx.format {
        OutputFormat::Text => value.format_text(),
        OutputFormat::Json => value.format_json()?,
    };
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn lines<T>(items: &[T], line: impl Fn(&T) -> String, empty: &str) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    items.iter().map(line).collect::<Vec<_>>().join("\n")
}

impl FormattedOutput for ProjectView {
    fn format_text(&self) -> String {
        format!(
            "project: {}\nresolution: {}x{}\noriginals: {}\npreprocessed: {}\ndataset folders: {}",
            self.path.display(),
            self.params.width,
            self.params.height,
            self.original.len(),
            self.source.len(),
            self.dataset.len()
        )
    }
}

impl FormattedOutput for [OriginalView] {
    fn format_text(&self) -> String {
        lines(self, |o| format!("{}  {}", &o.hash[..o.hash.len().min(12)], o.src.display()), "no images imported")
    }
}

impl FormattedOutput for [PreprocessItem] {
    fn format_text(&self) -> String {
        lines(
            self,
            |item| {
                format!(
                    "{}  {}  {}",
                    &item.hash[..item.hash.len().min(12)],
                    item.image_name,
                    item.captions.join(", ")
                )
            },
            "no preprocessed images",
        )
    }
}

impl FormattedOutput for [LoraModel] {
    fn format_text(&self) -> String {
        lines(
            self,
            |m| format!("{}  {}  ({} previews)", m.name, m.path, m.preview.len()),
            "no models",
        )
    }
}

impl FormattedOutput for [ModelFile] {
    fn format_text(&self) -> String {
        lines(self, |m| m.path.display().to_string(), "no models found")
    }
}

impl FormattedOutput for [RecentProject] {
    fn format_text(&self) -> String {
        lines(self, |p| format!("{}  {}", p.name, p.path), "no recent projects")
    }
}

impl FormattedOutput for [SavedProject] {
    fn format_text(&self) -> String {
        lines(self, |p| p.name.clone(), "no projects")
    }
}

impl FormattedOutput for [TrainConfig] {
    fn format_text(&self) -> String {
        lines(
            self,
            |c| {
                format!(
                    "{}  {}",
                    c.id.as_deref().unwrap_or("-"),
                    c.name.as_deref().unwrap_or("(unnamed)")
                )
            },
            "no train configs",
        )
    }
}

impl FormattedOutput for [DatasetFolder] {
    fn format_text(&self) -> String {
        lines(self, |f| format!("{}  {} images", f.dir_name(), f.images.len()), "no dataset folders")
    }
}

impl FormattedOutput for [LoraPreset] {
    fn format_text(&self) -> String {
        lines(
            self,
            |p| {
                let origin = if p.built_in { "built-in" } else { "user" };
                format!("{}  [{origin}]  {} params", p.name, p.params.len())
            },
            "no presets",
        )
    }
}

impl FormattedOutput for TrainerSettings {
    fn format_text(&self) -> String {
        // Flat key/value view of the camelCase JSON object
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) if !map.is_empty() => map
                .iter()
                .map(|(k, v)| format!("{k} = {v}"))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => "no settings".to_string(),
        }
    }
}

impl FormattedOutput for serde_json::Value {
    fn format_text(&self) -> String {
        match self {
            serde_json::Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_default(),
        }
    }
}

/// A path produced by a command, such as an exported file.
#[derive(Debug, Serialize)]
pub struct PathOutput {
    pub path: PathBuf,
}

impl FormattedOutput for PathOutput {
    fn format_text(&self) -> String {
        self.path.display().to_string()
    }
}

/// Human-readable line for an event, `None` for events not worth a line.
pub fn format_event(event: &UiEvent) -> Option<String> {
    let line = match event {
        UiEvent::PreprocessOut(ScriptEvent::Preprocess(e)) => match (e.event, e.progress()) {
            (PreprocessStage::ProcessProgress, Some((index, total))) => format!("preprocess {index}/{total}"),
            _ => format!("preprocess: {}", e.message),
        },
        UiEvent::PreprocessOut(e) | UiEvent::GenerateOut(e) => script_line(e)?,
        UiEvent::PreprocessDone(linked) => format!("preprocess done: {} images", linked.preprocess.len()),
        UiEvent::PreprocessExit(exit) | UiEvent::GenerateExit(exit) | UiEvent::TaskExit(exit) => exit_line(exit),
        UiEvent::PreprocessError(line) | UiEvent::CaptionError(line) | UiEvent::SegmentError(line) | UiEvent::GenerateError(line) => {
            format!("error: {line}")
        }
        UiEvent::ImportProgress(p) => format!("import {}/{} {}", p.current, p.total, p.name),
        UiEvent::CaptionOut(out) => {
            let tags: Vec<&str> = out.tags.iter().map(|t| t.tag.as_str()).collect();
            format!("{}: {}", out.filename.display(), tags.join(", "))
        }
        UiEvent::CaptionDone => "caption done".to_string(),
        UiEvent::SegmentOut(out) => format!("segment {}/{} {}", out.current, out.total, out.output.display()),
        UiEvent::ModelUpdated(models) => format!("models updated: {}", models.len()),
        UiEvent::LoraSaved(model) => format!("lora saved: {}", model.path),
        UiEvent::TrainProgress(s) => format!(
            "epoch {}/{} step {}/{} loss {:.4}",
            s.epoch, s.total_epoch, s.step, s.total_step, s.loss
        ),
        UiEvent::InstallLog(m) => m.message.clone(),
        UiEvent::CloneProgress(_) => return None,
        UiEvent::DoctorResult(check) => check.message.clone(),
        UiEvent::PreprocessImageRemoved(hashes) => format!("removed {} images", hashes.len()),
        UiEvent::NewPreprocessImage(item) => format!("new image: {}", item.image_name),
        UiEvent::TaskStderr { kind, line } => format!("[{kind}] {line}"),
        UiEvent::CaptionHistoryUpdate { .. } => return None,
    };
    Some(line)
}

fn script_line(event: &ScriptEvent) -> Option<String> {
    match event {
        ScriptEvent::Log(line) if !line.is_empty() => Some(line.clone()),
        ScriptEvent::Status { message, .. } => Some(message.clone()),
        ScriptEvent::Generate(out) => Some(format!("generated: {}", out.path.display())),
        _ => None,
    }
}

fn exit_line(exit: &TaskExit) -> String {
    match (exit.interrupted, exit.code) {
        (true, _) => format!("{} interrupted", exit.kind),
        (false, Some(code)) => format!("{} exited with code {code}", exit.kind),
        (false, None) => format!("{} killed by a signal", exit.kind),
    }
}

fn print_event(format: OutputFormat, event: &UiEvent) {
    match format {
        OutputFormat::Json => match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(event = event.name(), error = %e, "failed to encode event"),
        },
        OutputFormat::Text => {
            if let Some(line) = format_event(event) {
                println!("{line}");
            }
        }
    }
}

/// Prints bus events while a command runs.
pub struct EventPrinter {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl EventPrinter {
    pub fn start(bus: &EventBus, format: OutputFormat) -> Self {
        let mut rx = bus.subscribe();
        let (stop, mut stopped) = oneshot::channel();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Ok(event) => print_event(format, &event),
                        Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                        Err(RecvError::Closed) => break,
                    },
                    _ = &mut stopped => {
                        while let Ok(event) = rx.try_recv() {
                            print_event(format, &event);
                        }
                        break;
                    }
                }
            }
        });
        Self { stop, handle }
    }

    /// Print what is still queued and stop.
    pub async fn finish(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "event printer failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdtrainer_runner::TaskKind;
    use sdtrainer_server::TrainStatus;

    #[test]
    fn test_event_lines() {
        let exit = TaskExit {
            kind: TaskKind::Preprocess,
            code: Some(0),
            interrupted: false,
            timed_out: false,
        };
        assert_eq!(
            format_event(&UiEvent::PreprocessExit(exit)).unwrap(),
            "preprocess exited with code 0"
        );
        let status = TrainStatus {
            epoch: 1,
            step: 5,
            total_step: 10,
            total_epoch: 2,
            loss: 0.5,
            extra: Default::default(),
        };
        assert_eq!(
            format_event(&UiEvent::TrainProgress(status)).unwrap(),
            "epoch 1/2 step 5/10 loss 0.5000"
        );
        assert!(format_event(&UiEvent::PreprocessOut(ScriptEvent::Log(String::new()))).is_none());
    }

    #[test]
    fn test_empty_lists() {
        let models: Vec<ModelFile> = Vec::new();
        assert_eq!(models.format_text(), "no models found");
        let value = serde_json::json!("plain");
        assert_eq!(value.format_text(), "plain");
    }
}
