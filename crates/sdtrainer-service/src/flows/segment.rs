//! Cutting characters out of preprocessed images.

use super::require_exit;
use crate::context::AppContext;
use crate::error::ServiceResult;
use crate::events::UiEvent;
use sdtrainer_project::{PreprocessItem, PreprocessOutput};
use sdtrainer_runner::args::SegmentConfig;
use sdtrainer_runner::{ScriptEvent, TaskExit, TaskKind, TaskMessage};
use tracing::{error, info, instrument};

impl AppContext {
    /// Segment `items` into new preprocess images.
    ///
    /// Each output is linked to the original of the item it was cut from, so
    /// it shows up as one more preprocess image of that original.
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn segment_characters(&self, items: Vec<PreprocessItem>) -> ServiceResult<TaskExit> {
        let project = self.project().await?;
        let config = SegmentConfig {
            image_paths: items.iter().map(|item| item.image_path.clone()).collect(),
            out: project.layout().preprocess_dir(),
        };
        let command = self.script_command(&config)?;
        let mut run = self.supervisor(TaskKind::Segment).start(&command)?;
        info!(pid = run.pid, "segmentation started");

        let mut exit = None;
        while let Some(message) = run.next().await {
            match message {
                TaskMessage::Event(ScriptEvent::Error { err }) => {
                    error!(error = %err, "segment script reported an error");
                    self.emit(UiEvent::SegmentError(err));
                }
                TaskMessage::Event(ScriptEvent::Segment(out)) => {
                    let original = items
                        .iter()
                        .find(|item| item.image_path == out.path)
                        .and_then(|item| item.original_path.clone());
                    if let Some(original) = original {
                        let output = PreprocessOutput::new(original, out.output.clone());
                        match project.link_preprocess_outputs(vec![output]).await {
                            Ok(linked) => self.emit(UiEvent::PreprocessDone(linked)),
                            Err(e) => {
                                error!(error = %e, output = %out.output.display(), "failed to link segment output")
                            }
                        }
                    }
                    self.emit(UiEvent::SegmentOut(out));
                }
                TaskMessage::Event(_) => {}
                TaskMessage::Stderr(line) => self.emit(UiEvent::TaskStderr {
                    kind: TaskKind::Segment,
                    line,
                }),
                TaskMessage::Exit(status) => {
                    self.emit(UiEvent::TaskExit(status.clone()));
                    exit = Some(status);
                }
            }
        }
        require_exit(TaskKind::Segment, exit)
    }
}
