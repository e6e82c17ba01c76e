//! Callback routes against a recording handler.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use parking_lot::Mutex;
use sdtrainer_server::{create_router, CallbackHandler, CallbackServer, TrainStatus};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

#[derive(Default)]
struct Recorder {
    saved: Mutex<Vec<String>>,
    progress: Mutex<Vec<TrainStatus>>,
    fail_saves: bool,
}

#[async_trait]
impl CallbackHandler for Recorder {
    async fn on_lora_saved(&self, path: String) -> anyhow::Result<()> {
        self.saved.lock().push(path);
        if self.fail_saves {
            anyhow::bail!("project not open");
        }
        Ok(())
    }

    async fn on_train_progress(&self, status: TrainStatus) {
        self.progress.lock().push(status);
    }

    async fn on_make_lora(&self, path: String) -> anyhow::Result<Value> {
        if path.is_empty() {
            anyhow::bail!("no model");
        }
        Ok(json!({ "queued": path }))
    }
}

async fn post(handler: Arc<Recorder>, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = create_router(handler)
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn lora_saved_echoes_body_on_both_paths() {
    let handler = Arc::new(Recorder::default());
    for uri in ["/callback/loraSaved", "/callback/loreSaved"] {
        let (status, body) = post(handler.clone(), uri, json!({"path": "/out/m.safetensors"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"path": "/out/m.safetensors"}));
    }
    assert_eq!(handler.saved.lock().len(), 2);
}

#[tokio::test]
async fn lora_saved_failure_is_not_returned() {
    let handler = Arc::new(Recorder {
        fail_saves: true,
        ..Default::default()
    });
    let (status, body) = post(handler, "/callback/loraSaved", json!({"path": "/x"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "/x");
}

#[tokio::test]
async fn train_progress_is_forwarded() {
    let handler = Arc::new(Recorder::default());
    let (status, body) = post(
        handler.clone(),
        "/callback/trainProgress",
        json!({"status": {"epoch": 2, "step": 40, "total_step": 100, "total_epoch": 5, "loss": 0.08}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
    let progress = handler.progress.lock();
    assert_eq!(progress[0].epoch, 2);
    assert_eq!(progress[0].total_step, 100);
}

#[tokio::test]
async fn make_lora_errors_map_to_500() {
    let handler = Arc::new(Recorder::default());
    let (status, body) = post(handler.clone(), "/test/makeLora", json!({"path": "/m"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queued"], "/m");

    let (status, body) = post(handler, "/test/makeLora", json!({"path": ""})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "internal_error");
}

#[tokio::test]
async fn malformed_json_is_client_error() {
    let response = create_router(Arc::new(Recorder::default()))
        .oneshot(
            Request::post("/callback/loraSaved")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let (status, body) = post(Arc::new(Recorder::default()), "/nope", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn bind_probes_past_taken_port() {
    let first = CallbackServer::bind(47_310).await.unwrap();
    let taken = first.local_addr().port();
    let second = CallbackServer::bind(taken).await.unwrap();
    assert!(second.local_addr().port() > taken);
    assert_eq!(second.callback_url(), format!("http://localhost:{}", second.local_addr().port()));
}

#[tokio::test]
async fn serves_until_shutdown() {
    let server = CallbackServer::bind(47_410).await.unwrap();
    let url = server.callback_url();
    let handler = Arc::new(Recorder::default());
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(server.serve(handler.clone(), async {
        let _ = stop_rx.await;
    }));

    let response = reqwest::Client::new()
        .post(format!("{url}/callback/loraSaved"))
        .json(&json!({"path": "/out/a.safetensors"}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(handler.saved.lock()[0], "/out/a.safetensors");

    stop_tx.send(()).unwrap();
    task.await.unwrap().unwrap();
}
