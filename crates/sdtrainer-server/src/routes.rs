//! Route configuration for the callback server.

use crate::error::{ApiError, ApiResult};
use crate::handler::CallbackHandler;
use crate::types::{LoraSavedRequest, TrainProgressRequest};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Largest accepted request body.
const BODY_LIMIT: usize = 1024 * 1024;

type SharedHandler = Arc<dyn CallbackHandler>;

/// Create the callback router.
pub fn create_router(handler: SharedHandler) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT));

    Router::new()
        .route("/callback/loraSaved", post(lora_saved))
        // Older trainer builds post here
        .route("/callback/loreSaved", post(lora_saved))
        .route("/callback/trainProgress", post(train_progress))
        .route("/test/makeLora", post(make_lora))
        .fallback(fallback_handler)
        .layer(middleware)
        .with_state(handler)
}

/// Echoes the request. Failures are logged so the trainer keeps going.
async fn lora_saved(
    State(handler): State<SharedHandler>,
    Json(body): Json<LoraSavedRequest>,
) -> Json<LoraSavedRequest> {
    info!(path = %body.path, "lora saved callback");
    if let Err(e) = handler.on_lora_saved(body.path.clone()).await {
        error!(path = %body.path, error = %e, "failed to handle saved model");
    }
    Json(body)
}

async fn train_progress(
    State(handler): State<SharedHandler>,
    Json(body): Json<TrainProgressRequest>,
) -> Json<Value> {
    handler.on_train_progress(body.status).await;
    Json(json!({}))
}

async fn make_lora(
    State(handler): State<SharedHandler>,
    Json(body): Json<LoraSavedRequest>,
) -> ApiResult<Json<Value>> {
    let result = handler.on_make_lora(body.path).await.map_err(ApiError::from)?;
    Ok(Json(result))
}

async fn fallback_handler() -> impl IntoResponse {
    ApiError::NotFound("route".to_string())
}
