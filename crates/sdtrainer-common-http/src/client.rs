//! HTTP client configuration.

use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use std::time::Duration;

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout.
    pub request_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
    /// Proxy applied to every request.
    pub proxy: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
            user_agent: format!("sdtrainer/{}", env!("CARGO_PKG_VERSION")),
            proxy: None,
        }
    }
}

/// Build a configured HTTP client.
pub fn build_client(config: HttpConfig) -> Result<Client, HttpError> {
    let mut builder = ClientBuilder::new()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .user_agent(&config.user_agent);

    if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
        builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(HttpError::ClientBuild)?);
    }

    builder.build().map_err(HttpError::ClientBuild)
}

/// HTTP errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("server error: {status}")]
    ServerError { status: u16, body: String },

    #[error("client error: {status}")]
    ClientError { status: u16, body: String },

    #[error("failed to parse response (status {status}): {message}")]
    Parse { status: u16, message: String },
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HttpError::Timeout
        } else {
            HttpError::Request(e)
        }
    }
}

/// HTTP client bound to a base URL.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    base: url::Url,
}

impl HttpClient {
    /// Create a client for `base_url` with default config.
    pub fn new(base_url: &str) -> Result<Self, HttpError> {
        Self::with_config(base_url, HttpConfig::default())
    }

    /// Create a client for `base_url` with custom config.
    pub fn with_config(base_url: &str, config: HttpConfig) -> Result<Self, HttpError> {
        let inner = build_client(config)?;
        Ok(Self {
            inner,
            base: url::Url::parse(base_url)?,
        })
    }

    pub fn base_url(&self) -> &url::Url {
        &self.base
    }

    /// Resolve `path` against the base URL.
    pub fn url(&self, path: &str) -> Result<url::Url, HttpError> {
        Ok(self.base.join(path)?)
    }

    /// Make a GET request with query parameters.
    pub async fn get<Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<reqwest::Response, HttpError> {
        let url = self.url(path)?;
        tracing::debug!("Making GET request to: {}", url);
        let response = self.inner.get(url.clone()).query(query).send().await?;
        tracing::debug!("GET response: {} {}", response.status(), url);
        Self::check_response(response).await
    }

    /// Make a POST request with JSON body.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, HttpError> {
        let url = self.url(path)?;
        tracing::debug!("Making POST request to: {}", url);
        let response = self.inner.post(url.clone()).json(body).send().await?;
        tracing::debug!("POST response: {} {}", response.status(), url);
        Self::check_response(response).await
    }

    /// Make a multipart POST request with query parameters.
    pub async fn post_multipart<Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
        form: reqwest::multipart::Form,
    ) -> Result<reqwest::Response, HttpError> {
        let url = self.url(path)?;
        tracing::debug!("Making multipart POST request to: {}", url);
        let response = self
            .inner
            .post(url.clone())
            .query(query)
            .multipart(form)
            .send()
            .await?;
        tracing::debug!("POST response: {} {}", response.status(), url);
        Self::check_response(response).await
    }

    /// Check response status and convert errors.
    pub async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, HttpError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();

        if status.is_server_error() {
            Err(HttpError::ServerError {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(HttpError::ClientError {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_default_config() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.user_agent.starts_with("sdtrainer/"));
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(HttpClient::new("not a url"), Err(HttpError::InvalidUrl(_))));
    }

    #[test]
    fn test_client_with_proxy() {
        let config = HttpConfig {
            proxy: Some("http://127.0.0.1:7890".to_string()),
            ..Default::default()
        };
        assert!(HttpClient::with_config("http://localhost:8000", config).is_ok());
    }

    #[test]
    fn test_url_join() {
        let client = HttpClient::new("http://localhost:8000").unwrap();
        assert_eq!(
            client.url("/action/getprojectlist").unwrap().as_str(),
            "http://localhost:8000/action/getprojectlist"
        );
    }

    #[tokio::test]
    async fn test_get_with_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/action/getprojectmeta"))
            .and(query_param("id", "demo"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri()).unwrap();
        let response = client.get("/action/getprojectmeta", &[("id", "demo")]).await.unwrap();
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("stack trace"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri()).unwrap();
        match client.post_json("/broken", &serde_json::json!({})).await {
            Err(HttpError::ServerError { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "stack trace");
            }
            other => panic!("expected server error, got {:?}", other.map(|r| r.status())),
        }
        assert!(matches!(
            client.post_json("/missing", &serde_json::json!({})).await,
            Err(HttpError::ClientError { status: 404, .. })
        ));
    }
}
