use std::time::Duration;

use async_trait::async_trait;
use common::detection_config::DetectionConfig;
use common::devices::{CamerasResponse, MonitorsResponse, StatusSnapshot};
use common::zones::ZonesPayload;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::ConsoleApi;
use crate::error::{ConsoleError, Result};

/// HTTP client for the detection server API
#[derive(Clone, Debug)]
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.client.get(self.url(path)).send().await?;
        let response = check_status(path, response)?;
        let body = response.json::<T>().await?;
        debug!(path = %path, "fetched");
        Ok(body)
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        check_status(path, response)?;
        debug!(path = %path, "saved");
        Ok(())
    }
}

fn check_status(path: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ConsoleError::status(path, status))
    }
}

#[async_trait]
impl ConsoleApi for ApiClient {
    async fn cameras(&self) -> Result<CamerasResponse> {
        self.get_json("/api/cameras").await
    }

    async fn monitors(&self) -> Result<MonitorsResponse> {
        self.get_json("/api/monitors").await
    }

    async fn config(&self) -> Result<DetectionConfig> {
        self.get_json("/api/config").await
    }

    async fn save_config(&self, config: &DetectionConfig) -> Result<()> {
        self.post_json("/api/config", config).await
    }

    async fn zones(&self) -> Result<ZonesPayload> {
        self.get_json("/api/zones").await
    }

    async fn save_zones(&self, payload: &ZonesPayload) -> Result<()> {
        self.post_json("/api/zones", payload).await
    }

    async fn status(&self) -> Result<StatusSnapshot> {
        self.get_json("/api/status").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let client = ApiClient::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/api/config"), "http://localhost:5000/api/config");
    }

    #[tokio::test]
    async fn unreachable_server_is_http_error() {
        let client = ApiClient::new("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
        assert!(matches!(client.config().await, Err(ConsoleError::Http(_))));
    }
}
