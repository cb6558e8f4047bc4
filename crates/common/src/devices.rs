use serde::{Deserialize, Serialize};

/// Cameras report a numeric fps, or a marker string such as `"N/A"` when
/// the backend could not read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FpsValue {
  Number(f64),
  Text(String),
}

impl Default for FpsValue {
  fn default() -> Self {
    FpsValue::Text("N/A".to_string())
  }
}

impl std::fmt::Display for FpsValue {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      FpsValue::Number(n) => write!(f, "{}", n),
      FpsValue::Text(s) => write!(f, "{}", s),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
  pub index: u32,
  pub name: String,
  #[serde(default)]
  pub resolution: String,
  #[serde(default)]
  pub fps: FpsValue,
  #[serde(default)]
  pub backend: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CamerasResponse {
  #[serde(default)]
  pub cameras: Vec<CameraInfo>,
  #[serde(default)]
  pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorInfo {
  pub index: u32,
  pub name: String,
  #[serde(default)]
  pub width: Option<u32>,
  #[serde(default)]
  pub height: Option<u32>,
  #[serde(default)]
  pub left: Option<i32>,
  #[serde(default)]
  pub top: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorsResponse {
  #[serde(default)]
  pub monitors: Vec<MonitorInfo>,
  #[serde(default)]
  pub error: Option<String>,
}

/// Snapshot returned by `GET /api/status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
  #[serde(default)]
  pub running: bool,
  #[serde(default)]
  pub paused: bool,
  #[serde(default)]
  pub stats: crate::events::DetectionStats,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn camera_fps_accepts_number_or_text() {
    let resp: CamerasResponse = serde_json::from_value(json!({
      "cameras": [
        {"index": 0, "name": "Built-in", "resolution": "640x480", "fps": 30, "backend": "V4L2"},
        {"index": 1, "name": "USB", "resolution": "1280x720", "fps": "N/A", "backend": "V4L2"}
      ]
    }))
    .unwrap();
    assert_eq!(resp.cameras[0].fps, FpsValue::Number(30.0));
    assert_eq!(resp.cameras[1].fps.to_string(), "N/A");
    assert!(resp.error.is_none());
  }

  #[test]
  fn error_only_body_parses() {
    let resp: MonitorsResponse = serde_json::from_value(json!({"error": "no display"})).unwrap();
    assert!(resp.monitors.is_empty());
    assert_eq!(resp.error.as_deref(), Some("no display"));
  }
}
