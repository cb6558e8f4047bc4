//! Detection server configuration object.
//!
//! The server owns this document; the console loads it whole and writes it
//! back whole. Thresholds are passed through untouched, only their JSON
//! types are checked here. Keys this client does not model are kept in
//! [`DetectionConfig::extra`] so a full-replace save does not drop them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
  #[default]
  Webcam,
  Rtsp,
  Screen,
  Video,
}

impl std::fmt::Display for SourceType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SourceType::Webcam => write!(f, "webcam"),
      SourceType::Rtsp => write!(f, "rtsp"),
      SourceType::Screen => write!(f, "screen"),
      SourceType::Video => write!(f, "video"),
    }
  }
}

impl std::str::FromStr for SourceType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "webcam" => Ok(SourceType::Webcam),
      "rtsp" => Ok(SourceType::Rtsp),
      "screen" => Ok(SourceType::Screen),
      "video" => Ok(SourceType::Video),
      _ => Err(format!("Invalid source type: {}", s)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RtspTransport {
  #[default]
  Tcp,
  Udp,
}

impl std::fmt::Display for RtspTransport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RtspTransport::Tcp => write!(f, "tcp"),
      RtspTransport::Udp => write!(f, "udp"),
    }
  }
}

impl std::str::FromStr for RtspTransport {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "tcp" => Ok(RtspTransport::Tcp),
      "udp" => Ok(RtspTransport::Udp),
      _ => Err(format!("Invalid RTSP transport: {}", s)),
    }
  }
}

/// Field types are what the console writes back. Reading is lenient per
/// field, see [`DetectionConfig::from_map`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionConfig {
  pub source_type: SourceType,
  pub source_value: String,
  pub rtsp_url: String,
  pub rtsp_transport: RtspTransport,
  /// RTSP open timeout in milliseconds.
  pub timeout: u32,
  pub screen_monitor: String,

  pub weights: String,
  pub conf: f64,
  pub imgsz: u32,
  pub skip_frames: u32,

  pub tracker: String,
  pub use_geometric_filter: bool,
  pub min_time_zone: f64,
  pub min_bbox_area: u32,
  pub min_detection_confidence: f64,
  pub longitud_trayectoria: u32,
  pub umbral_movimiento_minimo: f64,
  pub zone_overlap_ratio: f64,

  pub cooldown: u32,
  pub max_retries: u32,

  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Default for DetectionConfig {
  fn default() -> Self {
    Self {
      source_type: SourceType::Webcam,
      source_value: default_source_value(),
      rtsp_url: String::new(),
      rtsp_transport: RtspTransport::Tcp,
      timeout: default_timeout(),
      screen_monitor: default_screen_monitor(),
      weights: default_weights(),
      conf: default_conf(),
      imgsz: default_imgsz(),
      skip_frames: 0,
      tracker: default_tracker(),
      use_geometric_filter: true,
      min_time_zone: default_min_time_zone(),
      min_bbox_area: default_min_bbox_area(),
      min_detection_confidence: default_min_detection_confidence(),
      longitud_trayectoria: default_trajectory_length(),
      umbral_movimiento_minimo: default_min_movement(),
      zone_overlap_ratio: default_overlap_ratio(),
      cooldown: default_cooldown(),
      max_retries: default_max_retries(),
      extra: Map::new(),
    }
  }
}

fn default_source_value() -> String {
  "0".to_string()
}

fn default_timeout() -> u32 {
  10_000
}

fn default_screen_monitor() -> String {
  "1".to_string()
}

fn default_weights() -> String {
  "yolov8n.pt".to_string()
}

fn default_conf() -> f64 {
  0.53
}

fn default_imgsz() -> u32 {
  640
}

fn default_tracker() -> String {
  "bytetrack".to_string()
}

fn default_min_time_zone() -> f64 {
  2.0
}

fn default_min_bbox_area() -> u32 {
  2000
}

fn default_min_detection_confidence() -> f64 {
  0.25
}

fn default_trajectory_length() -> u32 {
  10
}

fn default_min_movement() -> f64 {
  2.0
}

fn default_overlap_ratio() -> f64 {
  0.30
}

fn default_cooldown() -> u32 {
  10
}

fn default_max_retries() -> u32 {
  3
}

impl<'de> Deserialize<'de> for DetectionConfig {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    Map::<String, Value>::deserialize(deserializer).map(Self::from_map)
  }
}

impl DetectionConfig {
  /// Builds a config from a loose JSON object. A key that is missing,
  /// `null` or of the wrong type keeps its default; the rest of the
  /// object still loads. Keys not modelled here land in `extra`.
  pub fn from_map(mut map: Map<String, Value>) -> Self {
    let mut cfg = Self::default();
    let mut rejected = Vec::new();
    {
      let mut field = |key: &str, apply: &mut dyn FnMut(&Value) -> bool| {
        if let Some(value) = map.remove(key) {
          if !apply(&value) {
            rejected.push(key.to_string());
          }
        }
      };

      field("source_type", &mut |v| set(&mut cfg.source_type, parse_enum(v)));
      field("source_value", &mut |v| set(&mut cfg.source_value, text(v)));
      field("rtsp_url", &mut |v| set(&mut cfg.rtsp_url, text(v)));
      field("rtsp_transport", &mut |v| set(&mut cfg.rtsp_transport, parse_enum(v)));
      field("timeout", &mut |v| set(&mut cfg.timeout, count(v)));
      field("screen_monitor", &mut |v| set(&mut cfg.screen_monitor, text(v)));
      field("weights", &mut |v| set(&mut cfg.weights, text(v)));
      field("conf", &mut |v| set(&mut cfg.conf, number(v)));
      field("imgsz", &mut |v| set(&mut cfg.imgsz, count(v)));
      field("skip_frames", &mut |v| set(&mut cfg.skip_frames, count(v)));
      field("tracker", &mut |v| set(&mut cfg.tracker, text(v)));
      field("use_geometric_filter", &mut |v| set(&mut cfg.use_geometric_filter, v.as_bool()));
      field("min_time_zone", &mut |v| set(&mut cfg.min_time_zone, number(v)));
      field("min_bbox_area", &mut |v| set(&mut cfg.min_bbox_area, count(v)));
      field("min_detection_confidence", &mut |v| {
        set(&mut cfg.min_detection_confidence, number(v))
      });
      field("longitud_trayectoria", &mut |v| set(&mut cfg.longitud_trayectoria, count(v)));
      field("umbral_movimiento_minimo", &mut |v| {
        set(&mut cfg.umbral_movimiento_minimo, number(v))
      });
      field("zone_overlap_ratio", &mut |v| set(&mut cfg.zone_overlap_ratio, number(v)));
      field("cooldown", &mut |v| set(&mut cfg.cooldown, count(v)));
      field("max_retries", &mut |v| set(&mut cfg.max_retries, count(v)));
    }
    if !rejected.is_empty() {
      warn!(fields = ?rejected, "config fields with unusable values kept their defaults");
    }
    cfg.extra = map;
    cfg
  }
}

fn set<T>(slot: &mut T, value: Option<T>) -> bool {
  match value {
    Some(value) => {
      *slot = value;
      true
    }
    None => false,
  }
}

/// Strings as-is; bare numbers (older servers write device indices that
/// way) as their decimal text.
fn text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn number(value: &Value) -> Option<f64> {
  let n = match value {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => s.trim().parse().ok()?,
    _ => return None,
  };
  n.is_finite().then_some(n)
}

/// Non-negative integers; fractions are truncated.
fn count(value: &Value) -> Option<u32> {
  let n = number(value)?.trunc();
  (0.0..=u32::MAX as f64).contains(&n).then_some(n as u32)
}

fn parse_enum<T: std::str::FromStr>(value: &Value) -> Option<T> {
  value.as_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn empty_object_yields_defaults() {
    let cfg: DetectionConfig = serde_json::from_value(json!({})).unwrap();
    assert_eq!(cfg, DetectionConfig::default());
    assert_eq!(cfg.conf, 0.53);
    assert_eq!(cfg.screen_monitor, "1");
  }

  #[test]
  fn numeric_selectors_become_strings() {
    let cfg: DetectionConfig =
      serde_json::from_value(json!({"source_value": 2, "screen_monitor": 0})).unwrap();
    assert_eq!(cfg.source_value, "2");
    assert_eq!(cfg.screen_monitor, "0");
  }

  #[test]
  fn unknown_keys_survive_a_round_trip() {
    let cfg: DetectionConfig =
      serde_json::from_value(json!({"video_file": "clip.mp4", "source_type": "video"})).unwrap();
    assert_eq!(cfg.source_type, SourceType::Video);
    let back = serde_json::to_value(&cfg).unwrap();
    assert_eq!(back["video_file"], "clip.mp4");
    assert_eq!(back["cooldown"], 10);
  }

  #[test]
  fn unusable_values_fall_back_per_field() {
    let cfg: DetectionConfig = serde_json::from_value(json!({
      "cooldown": null,
      "skip_frames": 2.7,
      "min_bbox_area": "1500",
      "imgsz": -32,
      "conf": "high",
      "use_geometric_filter": "yes",
      "source_type": "rtsp",
      "zone_overlap_ratio": 0.45
    }))
    .unwrap();
    assert_eq!(cfg.cooldown, 10);
    assert_eq!(cfg.skip_frames, 2);
    assert_eq!(cfg.min_bbox_area, 1500);
    assert_eq!(cfg.imgsz, 640);
    assert_eq!(cfg.conf, 0.53);
    assert!(cfg.use_geometric_filter);
    assert_eq!(cfg.source_type, SourceType::Rtsp);
    assert_eq!(cfg.zone_overlap_ratio, 0.45);
    assert!(cfg.extra.is_empty());
  }

  #[test]
  fn non_object_is_still_an_error() {
    assert!(serde_json::from_value::<DetectionConfig>(json!([1, 2])).is_err());
  }

  #[test]
  fn source_type_parses_case_insensitively() {
    assert_eq!("RTSP".parse::<SourceType>().unwrap(), SourceType::Rtsp);
    assert!("ftp".parse::<SourceType>().is_err());
  }
}
