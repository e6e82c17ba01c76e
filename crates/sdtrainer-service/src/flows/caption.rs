//! Tagging images with one of the caption models.

use super::require_exit;
use crate::context::AppContext;
use crate::error::ServiceResult;
use crate::events::UiEvent;
use sdtrainer_common_core::Timestamp;
use sdtrainer_common_fs::file_name_string;
use sdtrainer_project::CaptionHistory;
use sdtrainer_runner::args::CaptionConfig;
use sdtrainer_runner::protocol::CaptionOut;
use sdtrainer_runner::{ScriptEvent, TaskExit, TaskKind, TaskMessage};
use tracing::{error, info, instrument, warn};

/// History entries for one tagged file, stamped with the current time.
pub fn caption_history(out: &CaptionOut, tagger_id: &str) -> Vec<CaptionHistory> {
    let created_at = Timestamp::now().to_iso8601();
    out.tags
        .iter()
        .map(|tag| CaptionHistory {
            tagger_id: tagger_id.to_string(),
            name: tag.tag.clone(),
            rank: tag.rank,
            created_at: created_at.clone(),
        })
        .collect()
}

impl AppContext {
    /// Run the tagger selected in `config` over its images.
    ///
    /// Tags of every result are added to the caption history of the matching
    /// preprocess image when a project is open. [`UiEvent::CaptionDone`] is
    /// emitted once a result arrived for each requested image.
    #[instrument(skip_all, fields(tagger = ?config.tagger, images = config.image_paths.len()))]
    pub async fn make_caption(&self, config: CaptionConfig) -> ServiceResult<TaskExit> {
        let command = self.script_command(&config)?;
        let project = self.current_project().await;
        let expected = config.image_paths.len();
        let mut run = self.supervisor(TaskKind::Caption).start(&command)?;
        info!(pid = run.pid, "caption started");

        let mut results = 0usize;
        let mut exit = None;
        while let Some(message) = run.next().await {
            match message {
                TaskMessage::Event(ScriptEvent::Error { err }) => {
                    error!(error = %err, "caption script reported an error");
                    self.emit(UiEvent::CaptionError(err));
                }
                TaskMessage::Event(ScriptEvent::Caption(out)) => {
                    if let (Some(project), false) = (&project, out.tags.is_empty()) {
                        let history = caption_history(&out, &config.tagger_id);
                        match project
                            .write_caption_history(file_name_string(&out.filename), history)
                            .await
                        {
                            Ok(history) => self.emit(UiEvent::CaptionHistoryUpdate {
                                filename: out.filename.clone(),
                                history,
                            }),
                            Err(e) => warn!(error = %e, file = %out.filename.display(), "failed to record caption history"),
                        }
                    }
                    self.emit(UiEvent::CaptionOut(out));
                    results += 1;
                    if results == expected {
                        self.emit(UiEvent::CaptionDone);
                    }
                }
                TaskMessage::Event(_) => {}
                TaskMessage::Stderr(line) => self.emit(UiEvent::TaskStderr {
                    kind: TaskKind::Caption,
                    line,
                }),
                TaskMessage::Exit(status) => {
                    self.emit(UiEvent::TaskExit(status.clone()));
                    exit = Some(status);
                }
            }
        }
        require_exit(TaskKind::Caption, exit)
    }
}
