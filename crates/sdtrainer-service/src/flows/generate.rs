//! Preview image generation for trained models.

use super::require_exit;
use crate::context::AppContext;
use crate::error::{ServiceError, ServiceResult};
use crate::events::UiEvent;
use sdtrainer_common_fs::ensure_dir;
use sdtrainer_runner::args::{GenerateRequest, Text2ImageOptions};
use sdtrainer_runner::{ScriptEvent, TaskExit, TaskKind, TaskMessage};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// Multiplier used when the caller does not pick one.
pub const DEFAULT_LORA_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoraImageRequest {
    pub lora_model_path: Option<PathBuf>,
    /// Text-to-image options. The project's preview props when absent.
    pub props: Option<Value>,
    pub lora: Option<f64>,
}

impl LoraImageRequest {
    pub fn for_model(path: impl Into<PathBuf>) -> Self {
        Self {
            lora_model_path: Some(path.into()),
            ..Default::default()
        }
    }
}

impl AppContext {
    /// Render previews with `gen_img_diffusers.py` into the project's `image/` folder.
    ///
    /// Every generated image is attached to the model it was rendered with,
    /// and the updated model is announced with [`UiEvent::ModelUpdated`].
    #[instrument(skip_all, fields(model = ?request.lora_model_path))]
    pub async fn generate_lora_image(&self, request: LoraImageRequest) -> ServiceResult<TaskExit> {
        let project = self.project().await?;
        let props = match request.props {
            Some(props) => props,
            None => project
                .preview_props()
                .await?
                .ok_or_else(|| ServiceError::not_configured("previewProps"))?,
        };
        let options: Text2ImageOptions = serde_json::from_value(props.clone())
            .map_err(|e| ServiceError::InvalidRequest(format!("preview props: {e}")))?;
        let outdir = project.layout().image_dir();
        ensure_dir(&outdir)?;

        let generate = GenerateRequest {
            options,
            lora_model_path: request.lora_model_path.clone(),
            lora: Some(request.lora.unwrap_or(DEFAULT_LORA_WEIGHT)),
            outdir,
        };
        let command = self.script_command(&generate)?;
        let mut run = self.supervisor(TaskKind::Generate).start(&command)?;
        info!(pid = run.pid, "text2image started");

        let model_path = request
            .lora_model_path
            .as_ref()
            .map(|p| p.display().to_string());
        let mut exit = None;
        while let Some(message) = run.next().await {
            match message {
                TaskMessage::Event(event) => {
                    match &event {
                        ScriptEvent::Error { err } => {
                            error!(error = %err, "generate script reported an error");
                            self.emit(UiEvent::GenerateError(err.clone()));
                        }
                        ScriptEvent::Generate(out) => {
                            if let Some(model_path) = &model_path {
                                match project
                                    .link_preview_image(out.filename.clone(), model_path.clone(), Some(props.clone()))
                                    .await
                                {
                                    Ok(Some(model)) => self.emit(UiEvent::ModelUpdated(vec![model])),
                                    Ok(None) => warn!(model = %model_path, "generated image for an unknown model"),
                                    Err(e) => error!(error = %e, "failed to link preview image"),
                                }
                            }
                        }
                        _ => {}
                    }
                    self.emit(UiEvent::GenerateOut(event));
                }
                TaskMessage::Stderr(line) => self.emit(UiEvent::TaskStderr {
                    kind: TaskKind::Generate,
                    line,
                }),
                TaskMessage::Exit(status) => {
                    self.emit(UiEvent::GenerateExit(status.clone()));
                    exit = Some(status);
                }
            }
        }
        require_exit(TaskKind::Generate, exit)
    }
}
