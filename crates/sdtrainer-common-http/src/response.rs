//! HTTP response helpers.

use crate::client::HttpError;
use serde::de::DeserializeOwned;

/// Parse a JSON response body.
pub async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, HttpError> {
    let status = response.status().as_u16();
    let bytes = response.bytes().await.map_err(HttpError::from)?;

    serde_json::from_slice(&bytes).map_err(|e| HttpError::Parse {
        status,
        message: format!("{e}: {}", String::from_utf8_lossy(&bytes)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpClient;
    use serde::Deserialize;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Named {
        name: String,
    }

    #[tokio::test]
    async fn test_parse_json_ok_and_invalid() {
        let server = MockServer::start().await;
        Mock::given(path("/good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "demo"})))
            .mount(&server)
            .await;
        Mock::given(path("/bad"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri()).unwrap();

        let good = client.get("/good", &()).await.unwrap();
        assert_eq!(parse_json::<Named>(good).await.unwrap().name, "demo");

        let bad = client.get("/bad", &()).await.unwrap();
        match parse_json::<Named>(bad).await {
            Err(HttpError::Parse { status, message }) => {
                assert_eq!(status, 200);
                assert!(message.contains("<html>"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
