//! The application side of the callbacks.

use crate::types::TrainStatus;
use async_trait::async_trait;
use serde_json::Value;

/// Reacts to reports from the training process.
#[async_trait]
pub trait CallbackHandler: Send + Sync + 'static {
    /// A checkpoint was saved at `path`.
    async fn on_lora_saved(&self, path: String) -> anyhow::Result<()>;

    async fn on_train_progress(&self, status: TrainStatus);

    /// Render preview images for the model at `path`.
    async fn on_make_lora(&self, path: String) -> anyhow::Result<Value>;
}
