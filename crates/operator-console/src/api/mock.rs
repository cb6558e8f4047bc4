//! In-memory stand-in for the detection server API.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use common::detection_config::DetectionConfig;
use common::devices::{CamerasResponse, MonitorsResponse, StatusSnapshot};
use common::zones::ZonesPayload;

use super::ConsoleApi;
use crate::error::{ConsoleError, Result};

/// `None` responses fail with a 500. Delays let tests pick the order in
/// which concurrent loads complete.
#[derive(Default)]
pub(crate) struct MockApi {
    pub(crate) cameras: Option<CamerasResponse>,
    pub(crate) monitors: Option<MonitorsResponse>,
    pub(crate) config: Option<DetectionConfig>,
    pub(crate) zones: ZonesPayload,
    pub(crate) camera_delay: Duration,
    pub(crate) monitor_delay: Duration,
    pub(crate) fail_saves: bool,
    pub(crate) saved_configs: Mutex<Vec<DetectionConfig>>,
    pub(crate) saved_zones: Mutex<Vec<ZonesPayload>>,
}

impl MockApi {
    pub(crate) fn saved_zones(&self) -> Vec<ZonesPayload> {
        self.saved_zones.lock().unwrap().clone()
    }

    pub(crate) fn saved_configs(&self) -> Vec<DetectionConfig> {
        self.saved_configs.lock().unwrap().clone()
    }
}

fn server_error(endpoint: &str) -> ConsoleError {
    ConsoleError::Status {
        endpoint: endpoint.to_string(),
        status: 500,
    }
}

#[async_trait]
impl ConsoleApi for MockApi {
    async fn cameras(&self) -> Result<CamerasResponse> {
        tokio::time::sleep(self.camera_delay).await;
        self.cameras.clone().ok_or_else(|| server_error("/api/cameras"))
    }

    async fn monitors(&self) -> Result<MonitorsResponse> {
        tokio::time::sleep(self.monitor_delay).await;
        self.monitors.clone().ok_or_else(|| server_error("/api/monitors"))
    }

    async fn config(&self) -> Result<DetectionConfig> {
        self.config.clone().ok_or_else(|| server_error("/api/config"))
    }

    async fn save_config(&self, config: &DetectionConfig) -> Result<()> {
        if self.fail_saves {
            return Err(server_error("/api/config"));
        }
        self.saved_configs.lock().unwrap().push(config.clone());
        Ok(())
    }

    async fn zones(&self) -> Result<ZonesPayload> {
        Ok(self.zones.clone())
    }

    async fn save_zones(&self, payload: &ZonesPayload) -> Result<()> {
        if self.fail_saves {
            return Err(server_error("/api/zones"));
        }
        self.saved_zones.lock().unwrap().push(payload.clone());
        Ok(())
    }

    async fn status(&self) -> Result<StatusSnapshot> {
        Ok(StatusSnapshot::default())
    }
}
