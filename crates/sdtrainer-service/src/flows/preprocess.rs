//! Preprocessing source images into training crops.

use super::require_exit;
use crate::context::AppContext;
use crate::error::ServiceResult;
use crate::events::UiEvent;
use sdtrainer_common_log::spans::Timer;
use sdtrainer_project::{Project, PreprocessOutput};
use sdtrainer_runner::args::PreprocessConfig;
use sdtrainer_runner::protocol::PreprocessEvent;
use sdtrainer_runner::{ScriptEvent, TaskExit, TaskKind, TaskMessage};
use tracing::{error, info, instrument};

impl AppContext {
    /// Run `preprocess_cli.py` for the open project.
    ///
    /// An empty destination means the project's `preprocess/` folder, and a
    /// missing resolution falls back to the project's. When the script reports
    /// `preprocess_done`, the outputs are linked to their originals and a
    /// [`UiEvent::PreprocessDone`] with the reconciled lists follows.
    #[instrument(skip_all)]
    pub async fn make_preprocess(&self, mut config: PreprocessConfig) -> ServiceResult<TaskExit> {
        let project = self.project().await?;
        if config.dest_path.as_os_str().is_empty() {
            config.dest_path = project.layout().preprocess_dir();
        }
        let params = project.read_meta().await?.params;
        config.width = config.width.or(Some(params.width));
        config.height = config.height.or(Some(params.height));

        let command = self.script_command(&config)?;
        let mut run = self.supervisor(TaskKind::Preprocess).start(&command)?;
        info!(pid = run.pid, dest = %config.dest_path.display(), "preprocess started");
        let timer = Timer::start("preprocess");

        let mut exit = None;
        while let Some(message) = run.next().await {
            match message {
                TaskMessage::Event(event) => {
                    if let ScriptEvent::Preprocess(done) = &event {
                        self.link_preprocess_done(&project, done).await;
                    }
                    self.emit(UiEvent::PreprocessOut(event));
                }
                TaskMessage::Stderr(line) => self.emit(UiEvent::PreprocessError(line)),
                TaskMessage::Exit(status) => {
                    self.emit(UiEvent::PreprocessExit(status.clone()));
                    exit = Some(status);
                }
            }
        }
        timer.finish();
        require_exit(TaskKind::Preprocess, exit)
    }

    async fn link_preprocess_done(&self, project: &Project, event: &PreprocessEvent) {
        let Some(pairs) = event.outputs() else {
            return;
        };
        let outputs = pairs
            .into_iter()
            .map(|pair| PreprocessOutput::new(pair.src, pair.dest))
            .collect();
        match project.link_preprocess_outputs(outputs).await {
            Ok(linked) => self.emit(UiEvent::PreprocessDone(linked)),
            Err(e) => {
                error!(error = %e, "failed to link preprocess outputs");
                self.emit(UiEvent::PreprocessError(e.to_string()));
            }
        }
    }
}
