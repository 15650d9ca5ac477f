//! HTTP manifest source

use std::time::Duration;

use tracing::{debug, warn};

use crate::repository::error::FetchError;
use crate::repository::source::RepositorySource;

/// Fetches manifests with a single GET per locator
pub struct HttpSource {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl HttpSource {
    /// Creates a new HttpSource with a wall-clock timeout per request
    pub fn new(timeout_ms: u64, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client, timeout_ms })
    }

    fn classify(&self, locator: &str, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                locator: locator.to_string(),
                timeout_ms: self.timeout_ms,
            }
        } else {
            FetchError::Network {
                locator: locator.to_string(),
                source: error,
            }
        }
    }
}

#[async_trait::async_trait]
impl RepositorySource for HttpSource {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        debug!("Fetching repository manifest {}", locator);

        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| self.classify(locator, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Repository host returned status {}: {}", status, locator);
            return Err(FetchError::InvalidResponse {
                locator: locator.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.classify(locator, e))?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn fetch_returns_body_on_success() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/vpm.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "Example", "packages": {}}"#)
            .create_async()
            .await;

        let source = HttpSource::new(5_000, "vpm-registry-test").unwrap();
        let locator = format!("{}/vpm.json", server.url());
        let body = source.fetch(&locator).await.unwrap();

        mock.assert_async().await;
        assert_eq!(body, br#"{"name": "Example", "packages": {}}"#);
    }

    #[tokio::test]
    async fn fetch_sends_configured_user_agent() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/vpm.json")
            .match_header("user-agent", "vpm-registry-test")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let source = HttpSource::new(5_000, "vpm-registry-test").unwrap();
        source
            .fetch(&format!("{}/vpm.json", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_reports_unexpected_status_with_locator() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/missing.json")
            .with_status(404)
            .create_async()
            .await;

        let source = HttpSource::new(5_000, "vpm-registry-test").unwrap();
        let locator = format!("{}/missing.json", server.url());
        let result = source.fetch(&locator).await;

        mock.assert_async().await;
        match result {
            Err(FetchError::InvalidResponse {
                locator: failed,
                status,
            }) => {
                assert_eq!(failed, locator);
                assert_eq!(status, 404);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn fetch_reports_network_error_for_unreachable_host() {
        let source = HttpSource::new(2_000, "vpm-registry-test").unwrap();

        let result = source.fetch("http://127.0.0.1:1/vpm.json").await;

        assert!(matches!(
            result,
            Err(FetchError::Network { .. }) | Err(FetchError::Timeout { .. })
        ));
    }
}
