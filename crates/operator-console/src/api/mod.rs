//! JSON API of the detection server.

use async_trait::async_trait;
use common::detection_config::DetectionConfig;
use common::devices::{CamerasResponse, MonitorsResponse, StatusSnapshot};
use common::zones::ZonesPayload;

use crate::error::Result;

pub mod client;

pub use client::ApiClient;

/// Every write is a full replace of the server-held document.
#[async_trait]
pub trait ConsoleApi: Send + Sync {
    async fn cameras(&self) -> Result<CamerasResponse>;

    async fn monitors(&self) -> Result<MonitorsResponse>;

    async fn config(&self) -> Result<DetectionConfig>;

    async fn save_config(&self, config: &DetectionConfig) -> Result<()>;

    async fn zones(&self) -> Result<ZonesPayload>;

    async fn save_zones(&self, payload: &ZonesPayload) -> Result<()>;

    async fn status(&self) -> Result<StatusSnapshot>;
}

#[cfg(test)]
pub(crate) mod mock;
