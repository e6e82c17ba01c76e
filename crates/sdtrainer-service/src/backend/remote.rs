//! Client of a remote trainer service.
//!
//! The service answers every action with an [`ApiResponse`] envelope and
//! reports paths relative to its own root, which are rewritten into links
//! under the base url before they reach the caller.

use super::{Backend, SavedProject};
use crate::error::{ServiceError, ServiceResult};
use crate::flows::library::RecentProject;
use async_trait::async_trait;
use parking_lot::RwLock;
use sdtrainer_common_http::{multipart, parse_json, HttpClient, Response};
use sdtrainer_project::{LoraModel, NewProjectParam, OriginalView, PreprocessItem, ProjectMeta, ProjectView, TrainConfig};
use sdtrainer_runner::args::PreprocessConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub const DEFAULT_REMOTE_URL: &str = "http://localhost:8000";

const SUCCESS: &str = "success";

/// Response envelope of the remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// The payload, or [`ServiceError::Remote`] when the call failed or carried none.
    pub fn into_data(self) -> ServiceResult<T> {
        if self.result != SUCCESS {
            return Err(ServiceError::Remote {
                message: self.error.unwrap_or(self.result),
            });
        }
        self.data.ok_or_else(|| ServiceError::Remote {
            message: "no data".to_string(),
        })
    }
}

/// Backend that forwards project operations over HTTP.
#[derive(Debug)]
pub struct RemoteBackend {
    client: HttpClient,
    base: String,
    open_project: RwLock<Option<String>>,
}

impl RemoteBackend {
    pub fn new(base_url: &str) -> ServiceResult<Self> {
        Ok(Self {
            client: HttpClient::new(base_url)?,
            base: base_url.trim_end_matches('/').to_string(),
            open_project: RwLock::new(None),
        })
    }

    /// Id of the project opened through this backend.
    pub fn open_project_id(&self) -> Option<String> {
        self.open_project.read().clone()
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ServiceResult<ApiResponse<T>> {
        Ok(parse_json(response).await?)
    }

    pub async fn read_project_meta(&self, id: &str) -> ServiceResult<ProjectMeta> {
        let response = self.client.get("/action/getprojectmeta", &[("id", id)]).await?;
        Self::decode::<ProjectMeta>(response).await?.into_data()
    }

    fn real_link(&self, path: &Path) -> PathBuf {
        PathBuf::from(format!("{}{}", self.base, path.display()))
    }

    fn link_items(&self, items: &mut [PreprocessItem]) {
        for item in items {
            item.image_path = self.real_link(&item.image_path);
            item.original_path = item.original_path.as_deref().map(|p| self.real_link(p));
            item.caption_path = item.caption_path.as_deref().map(|p| self.real_link(p));
        }
    }

    fn link_originals(&self, items: &mut [OriginalView]) {
        for item in items {
            item.src = self.real_link(&item.src);
            item.thumbnail = self.real_link(&item.thumbnail);
        }
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    #[instrument(skip_all, fields(name = %param.name))]
    async fn new_project(&self, param: NewProjectParam) -> ServiceResult<ProjectView> {
        let body = json!({ "name": param.name, "width": param.width, "height": param.height });
        let response = self.client.post_json("/action/newproject", &body).await?;
        let mut view = Self::decode::<ProjectView>(response).await?.into_data()?;
        view.path = PathBuf::from(&param.name);
        *self.open_project.write() = Some(param.name);
        info!("remote project created");
        Ok(view)
    }

    #[instrument(skip(self))]
    async fn load_project(&self, project_path: &str) -> ServiceResult<ProjectView> {
        let response = self
            .client
            .post_json("/action/loadproject", &json!({ "name": project_path }))
            .await?;
        let mut view = Self::decode::<ProjectView>(response).await?.into_data()?;
        self.link_items(&mut view.source);
        self.link_originals(&mut view.original);
        view.path = PathBuf::from(project_path);
        *self.open_project.write() = Some(project_path.to_string());
        Ok(view)
    }

    async fn list_train_configs(&self) -> ServiceResult<Vec<TrainConfig>> {
        let Some(id) = self.open_project_id() else {
            return Ok(Vec::new());
        };
        Ok(self.read_project_meta(&id).await?.train_configs)
    }

    /// The remote service does not list models.
    async fn load_models(&self) -> ServiceResult<Vec<LoraModel>> {
        Ok(Vec::new())
    }

    async fn recent_projects(&self) -> ServiceResult<Vec<RecentProject>> {
        Ok(Vec::new())
    }

    async fn project_list(&self) -> ServiceResult<Vec<SavedProject>> {
        let response = self.client.get("/action/getprojectlist", &()).await?;
        let listed = Self::decode::<Vec<SavedProject>>(response).await?;
        Ok(listed.data.unwrap_or_default())
    }

    /// Upload `config.files` to the open project.
    async fn make_preprocess(&self, config: PreprocessConfig) -> ServiceResult<()> {
        let id = self.open_project_id().ok_or(ServiceError::NoProject)?;
        let mut form = multipart::Form::new();
        for file in config.files.unwrap_or_default() {
            let bytes = tokio::fs::read(&file).await?;
            let part = multipart::Part::bytes(bytes).file_name(sdtrainer_common_fs::file_name_string(&file));
            form = form.part("file", part);
        }
        let response = self
            .client
            .post_multipart("/action/makepreorpcess", &[("id", id.as_str())], form)
            .await?;
        let reply = Self::decode::<serde_json::Value>(response).await?;
        if reply.result != SUCCESS {
            return Err(ServiceError::Remote {
                message: reply.error.unwrap_or(reply.result),
            });
        }
        debug!(project = %id, "remote preprocess accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn project_body() -> serde_json::Value {
        json!({
            "result": "success",
            "data": {
                "source": [{
                    "hash": "h1",
                    "imageName": "a.png",
                    "imagePath": "/static/demo/a.png",
                    "originalPath": "/static/demo/original/a.png"
                }],
                "original": [{
                    "hash": "o1",
                    "src": "/static/demo/original/a.png",
                    "thumbnail": "/static/demo/thumbnail/a.png"
                }],
                "dataset": [],
                "params": {"width": 512, "height": 768}
            }
        })
    }

    #[tokio::test]
    async fn test_load_project_rewrites_links() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/action/loadproject"))
            .and(body_json(json!({"name": "demo"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_body()))
            .mount(&server)
            .await;

        let backend = RemoteBackend::new(&server.uri()).unwrap();
        let view = backend.load_project("demo").await.unwrap();
        assert_eq!(view.path, PathBuf::from("demo"));
        assert_eq!(
            view.source[0].image_path,
            PathBuf::from(format!("{}/static/demo/a.png", server.uri()))
        );
        assert_eq!(
            view.original[0].thumbnail,
            PathBuf::from(format!("{}/static/demo/thumbnail/a.png", server.uri()))
        );
        assert_eq!(view.params.height, 768);
        assert_eq!(backend.open_project_id().as_deref(), Some("demo"));
    }

    #[tokio::test]
    async fn test_train_configs_from_meta() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/action/newproject"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/action/getprojectmeta"))
            .and(query_param("id", "demo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "success",
                "data": {"trainConfigs": [{"id": "c1", "name": "default", "extraParams": []}]}
            })))
            .mount(&server)
            .await;

        let backend = RemoteBackend::new(&server.uri()).unwrap();
        assert!(backend.list_train_configs().await.unwrap().is_empty());

        let view = backend
            .new_project(NewProjectParam {
                name: "demo".into(),
                path: None,
                width: 512,
                height: 768,
            })
            .await
            .unwrap();
        assert_eq!(view.path, PathBuf::from("demo"));
        let configs = backend.list_train_configs().await.unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].id.as_deref(), Some("c1"));
        assert!(backend.load_models().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_envelope_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/action/loadproject"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "error",
                "error": "project not found"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/action/getprojectlist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "success",
                "data": [{"name": "demo"}, {"name": "other"}]
            })))
            .mount(&server)
            .await;

        let backend = RemoteBackend::new(&server.uri()).unwrap();
        match backend.load_project("missing").await {
            Err(ServiceError::Remote { message }) => assert_eq!(message, "project not found"),
            other => panic!("expected remote error, got {other:?}"),
        }
        assert!(backend.open_project_id().is_none());
        let listed = backend.project_list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].name, "other");
    }

    #[tokio::test]
    async fn test_make_preprocess_uploads_files() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/action/loadproject"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_body()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/action/makepreorpcess"))
            .and(query_param("id", "demo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "success"})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"png").unwrap();

        let backend = RemoteBackend::new(&server.uri()).unwrap();
        let config = PreprocessConfig {
            files: Some(vec![file]),
            ..Default::default()
        };
        assert!(matches!(
            backend.make_preprocess(config.clone()).await,
            Err(ServiceError::NoProject)
        ));
        backend.load_project("demo").await.unwrap();
        backend.make_preprocess(config).await.unwrap();
    }
}
