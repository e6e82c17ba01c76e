//! Events pushed to front ends while operations run.

use sdtrainer_project::{CaptionHistory, ImportProgress, LinkedOutputs, LoraModel, PreprocessItem};
use sdtrainer_runner::protocol::{CaptionOut, DoctorOutput, SegOut};
use sdtrainer_runner::{ScriptEvent, TaskExit, TaskKind};
use sdtrainer_server::TrainStatus;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::trace;

/// Events buffered per subscriber before the oldest are dropped.
pub const EVENT_CAPACITY: usize = 1024;

/// Severity of an installer message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallLevel {
    Info,
    Error,
}

/// Installer milestone a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallStage {
    StartInstall,
    Message,
    InstallSuccess,
    InstallFail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallMessage {
    pub message: String,
    #[serde(rename = "type")]
    pub level: InstallLevel,
    pub event: InstallStage,
}

impl InstallMessage {
    pub fn info(stage: InstallStage, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: InstallLevel::Info,
            event: stage,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: InstallLevel::Error,
            event: InstallStage::InstallFail,
        }
    }
}

/// Clone progress of one repository, in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloneProgress {
    pub progress: f64,
    pub name: String,
}

/// Everything a front end can be told about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum UiEvent {
    /// Every parsed line of a preprocess run.
    PreprocessOut(ScriptEvent),
    PreprocessError(String),
    /// Outputs were linked and the project reconciled.
    PreprocessDone(LinkedOutputs),
    PreprocessExit(TaskExit),
    ImportProgress(ImportProgress),
    CaptionOut(CaptionOut),
    CaptionError(String),
    CaptionHistoryUpdate {
        filename: PathBuf,
        history: Option<Vec<CaptionHistory>>,
    },
    /// One result arrived for every requested image.
    CaptionDone,
    SegmentOut(SegOut),
    SegmentError(String),
    GenerateOut(ScriptEvent),
    GenerateError(String),
    ModelUpdated(Vec<LoraModel>),
    GenerateExit(TaskExit),
    LoraSaved(LoraModel),
    TrainProgress(TrainStatus),
    InstallLog(InstallMessage),
    CloneProgress(CloneProgress),
    DoctorResult(DoctorOutput),
    PreprocessImageRemoved(Vec<String>),
    NewPreprocessImage(PreprocessItem),
    /// A stderr line of a script without a dedicated error event.
    TaskStderr { kind: TaskKind, line: String },
    TaskExit(TaskExit),
}

impl UiEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            UiEvent::PreprocessOut(_) => "preprocessOut",
            UiEvent::PreprocessError(_) => "preprocessError",
            UiEvent::PreprocessDone(_) => "preprocessDone",
            UiEvent::PreprocessExit(_) => "preprocessExit",
            UiEvent::ImportProgress(_) => "importProgress",
            UiEvent::CaptionOut(_) => "captionOut",
            UiEvent::CaptionError(_) => "captionError",
            UiEvent::CaptionHistoryUpdate { .. } => "captionHistoryUpdate",
            UiEvent::CaptionDone => "captionDone",
            UiEvent::SegmentOut(_) => "segmentOut",
            UiEvent::SegmentError(_) => "segmentError",
            UiEvent::GenerateOut(_) => "generateOut",
            UiEvent::GenerateError(_) => "generateError",
            UiEvent::ModelUpdated(_) => "modelUpdated",
            UiEvent::GenerateExit(_) => "generateExit",
            UiEvent::LoraSaved(_) => "loraSaved",
            UiEvent::TrainProgress(_) => "trainProgress",
            UiEvent::InstallLog(_) => "installLog",
            UiEvent::CloneProgress(_) => "cloneProgress",
            UiEvent::DoctorResult(_) => "doctorResult",
            UiEvent::PreprocessImageRemoved(_) => "preprocessImageRemoved",
            UiEvent::NewPreprocessImage(_) => "newPreprocessImage",
            UiEvent::TaskStderr { .. } => "taskStderr",
            UiEvent::TaskExit(_) => "taskExit",
        }
    }
}

/// Fan-out of [`UiEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UiEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish `event`. Events sent while nobody listens are dropped.
    pub fn emit(&self, event: UiEvent) {
        trace!(event = event.name(), "emit");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_bus_fans_out() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(UiEvent::CaptionDone);
        assert_eq!(a.recv().await.unwrap(), UiEvent::CaptionDone);
        assert_eq!(b.recv().await.unwrap(), UiEvent::CaptionDone);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        bus.emit(UiEvent::PreprocessError("boom".into()));
        assert_eq!(bus.receiver_count(), 0);
    }

    #[test]
    fn test_wire_shape() {
        let event = UiEvent::InstallLog(InstallMessage::info(InstallStage::StartInstall, "start install"));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "installLog", "data": {"message": "start install", "type": "info", "event": "start-install"}})
        );
        assert_eq!(serde_json::to_value(UiEvent::CaptionDone).unwrap(), json!({"event": "captionDone"}));
        assert_eq!(UiEvent::CaptionDone.name(), "captionDone");
    }
}
