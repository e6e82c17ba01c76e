//! Reactions to the training process's callbacks.

use super::generate::LoraImageRequest;
use crate::context::AppContext;
use crate::error::ServiceResult;
use crate::events::UiEvent;
use async_trait::async_trait;
use sdtrainer_server::{CallbackHandler, CallbackServer, TrainStatus};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// [`CallbackHandler`] backed by the application context.
#[derive(Debug, Clone)]
pub struct TrainCallbacks {
    ctx: Arc<AppContext>,
}

impl TrainCallbacks {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Render the preview of `path` in the background.
    fn spawn_preview(&self, path: String) {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            match ctx.generate_lora_image(LoraImageRequest::for_model(&path)).await {
                Ok(exit) => info!(model = %path, code = ?exit.code, "preview generation finished"),
                Err(e) => warn!(model = %path, error = %e, "preview generation skipped"),
            }
        });
    }
}

#[async_trait]
impl CallbackHandler for TrainCallbacks {
    async fn on_lora_saved(&self, path: String) -> anyhow::Result<()> {
        let project = self.ctx.project().await?;
        let model = project.on_lora_saved(path.clone()).await?;
        info!(model = %path, "lora saved");
        self.ctx.emit(UiEvent::LoraSaved(model));
        self.spawn_preview(path);
        Ok(())
    }

    async fn on_train_progress(&self, status: TrainStatus) {
        self.ctx.emit(UiEvent::TrainProgress(status));
    }

    async fn on_make_lora(&self, path: String) -> anyhow::Result<Value> {
        self.spawn_preview(path.clone());
        Ok(json!({ "path": path }))
    }
}

/// Bind the callback server from `start_port` and record its url.
pub async fn bind_callback_server(ctx: &AppContext, start_port: u16) -> ServiceResult<CallbackServer> {
    let server = CallbackServer::bind(start_port).await?;
    ctx.set_callback_url(server.callback_url());
    Ok(server)
}

/// Serve callbacks for `ctx` until `shutdown` resolves.
pub async fn serve_callbacks<F>(ctx: Arc<AppContext>, server: CallbackServer, shutdown: F) -> ServiceResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let handler = Arc::new(TrainCallbacks::new(ctx));
    server.serve(handler, shutdown).await.map_err(|e| {
        error!(error = %e, "callback server failed");
        e.into()
    })
}
