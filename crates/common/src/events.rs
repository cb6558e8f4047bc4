//! Push channel vocabulary.
//!
//! Every message on the push channel is a JSON envelope
//! `{"event": <name>, "data": <payload>}`. Inbound envelopes decode into
//! [`ServerEvent`], outbound ones are built from [`ClientIntent`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
  pub event: String,
  #[serde(default)]
  pub data: Value,
}

/// Counters the detection server attaches to status and frame pushes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionStats {
  pub fps: f64,
  pub frame_count: u64,
  pub detections: u64,
  pub tracks_active: u64,
  pub in_zone: u64,
  pub filtered: u64,
  pub alerts: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
  /// The pause echo omits this field.
  #[serde(default)]
  pub running: Option<bool>,
  #[serde(default)]
  pub paused: Option<bool>,
  #[serde(default)]
  pub stats: Option<DetectionStats>,
}

/// A base64 JPEG frame. The dashboard feed carries `stats`, the zone
/// editor feed carries the native `width`/`height`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
  pub frame: String,
  #[serde(default)]
  pub width: Option<u32>,
  #[serde(default)]
  pub height: Option<u32>,
  #[serde(default)]
  pub stats: Option<DetectionStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
  pub track_id: i64,
  pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum LogLevel {
  Success,
  #[default]
  Info,
  Warning,
  Danger,
  Error,
}

impl LogLevel {
  /// `danger` and `error` share the error style.
  pub fn is_error(&self) -> bool {
    matches!(self, LogLevel::Danger | LogLevel::Error)
  }
}

impl From<String> for LogLevel {
  fn from(s: String) -> Self {
    match s.to_lowercase().as_str() {
      "success" => LogLevel::Success,
      "warning" => LogLevel::Warning,
      "danger" => LogLevel::Danger,
      "error" => LogLevel::Error,
      _ => LogLevel::Info,
    }
  }
}

impl std::fmt::Display for LogLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      LogLevel::Success => "success",
      LogLevel::Info => "info",
      LogLevel::Warning => "warning",
      LogLevel::Danger => "danger",
      LogLevel::Error => "error",
    };
    write!(f, "{}", s)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
  pub message: String,
  #[serde(default)]
  pub level: LogLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
  pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
  Status(StatusUpdate),
  VideoFrame(FramePayload),
  Alert(AlertEvent),
  Log(LogEvent),
  StreamError(MessageEvent),
  BackgroundFrame(FramePayload),
  BackgroundError(MessageEvent),
}

impl ServerEvent {
  pub fn name(&self) -> &'static str {
    match self {
      ServerEvent::Status(_) => "status",
      ServerEvent::VideoFrame(_) => "video_frame",
      ServerEvent::Alert(_) => "alert",
      ServerEvent::Log(_) => "log",
      ServerEvent::StreamError(_) => "stream_error",
      ServerEvent::BackgroundFrame(_) => "background_frame",
      ServerEvent::BackgroundError(_) => "background_error",
    }
  }

  /// Decodes an envelope. Returns `Ok(None)` for event names this client
  /// does not handle.
  pub fn from_envelope(envelope: Envelope) -> Result<Option<Self>, serde_json::Error> {
    let data = envelope.data;
    let event = match envelope.event.as_str() {
      "status" => ServerEvent::Status(serde_json::from_value(data)?),
      "video_frame" => ServerEvent::VideoFrame(serde_json::from_value(data)?),
      "alert" => ServerEvent::Alert(serde_json::from_value(data)?),
      "log" => ServerEvent::Log(serde_json::from_value(data)?),
      "stream_error" => ServerEvent::StreamError(serde_json::from_value(data)?),
      "background_frame" => ServerEvent::BackgroundFrame(serde_json::from_value(data)?),
      "background_error" => ServerEvent::BackgroundError(serde_json::from_value(data)?),
      _ => return Ok(None),
    };
    Ok(Some(event))
  }

  pub fn from_json(text: &str) -> Result<Option<Self>, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(text)?;
    Self::from_envelope(envelope)
  }

  pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
    let data = match self {
      ServerEvent::Status(p) => serde_json::to_value(p)?,
      ServerEvent::VideoFrame(p) | ServerEvent::BackgroundFrame(p) => serde_json::to_value(p)?,
      ServerEvent::Alert(p) => serde_json::to_value(p)?,
      ServerEvent::Log(p) => serde_json::to_value(p)?,
      ServerEvent::StreamError(p) | ServerEvent::BackgroundError(p) => serde_json::to_value(p)?,
    };
    Ok(Envelope {
      event: self.name().to_string(),
      data,
    })
  }
}

/// Operator intents sent to the server. None of them carry a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientIntent {
  StartDetection,
  /// Doubles as resume when the server is paused.
  PauseDetection,
  StopDetection,
  StartZonesStream,
  StopZonesStream,
  CaptureBackground,
}

impl ClientIntent {
  pub fn name(&self) -> &'static str {
    match self {
      ClientIntent::StartDetection => "start_detection",
      ClientIntent::PauseDetection => "pause_detection",
      ClientIntent::StopDetection => "stop_detection",
      ClientIntent::StartZonesStream => "start_zones_stream",
      ClientIntent::StopZonesStream => "stop_zones_stream",
      ClientIntent::CaptureBackground => "capture_background",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "start_detection" => Some(ClientIntent::StartDetection),
      "pause_detection" => Some(ClientIntent::PauseDetection),
      "stop_detection" => Some(ClientIntent::StopDetection),
      "start_zones_stream" => Some(ClientIntent::StartZonesStream),
      "stop_zones_stream" => Some(ClientIntent::StopZonesStream),
      "capture_background" => Some(ClientIntent::CaptureBackground),
      _ => None,
    }
  }

  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Envelope {
      event: self.name().to_string(),
      data: Value::Null,
    })
  }
}

impl std::fmt::Display for ClientIntent {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.name())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn status_without_running_keeps_field_empty() {
    let text = json!({"event": "status", "data": {"paused": true}}).to_string();
    let event = ServerEvent::from_json(&text).unwrap().unwrap();
    match event {
      ServerEvent::Status(update) => {
        assert_eq!(update.running, None);
        assert_eq!(update.paused, Some(true));
        assert!(update.stats.is_none());
      }
      other => panic!("unexpected event {:?}", other),
    }
  }

  #[test]
  fn dashboard_frame_carries_stats() {
    let text = json!({
      "event": "video_frame",
      "data": {
        "frame": "abc",
        "stats": {"fps": 14.5, "frame_count": 1200, "detections": 3,
                  "tracks_active": 2, "in_zone": 1, "filtered": 0, "alerts": 4}
      }
    })
    .to_string();
    let event = ServerEvent::from_json(&text).unwrap().unwrap();
    let ServerEvent::VideoFrame(frame) = event else {
      panic!("expected frame");
    };
    assert_eq!(frame.width, None);
    let stats = frame.stats.unwrap();
    assert_eq!(stats.frame_count, 1200);
    assert_eq!(stats.alerts, 4);
  }

  #[test]
  fn unknown_log_level_falls_back_to_info() {
    let text = json!({"event": "log", "data": {"message": "hi", "level": "verbose"}}).to_string();
    let event = ServerEvent::from_json(&text).unwrap().unwrap();
    assert_eq!(
      event,
      ServerEvent::Log(LogEvent {
        message: "hi".into(),
        level: LogLevel::Info
      })
    );
    assert!(LogLevel::from("danger".to_string()).is_error());
  }

  #[test]
  fn unknown_event_is_skipped() {
    let text = json!({"event": "heartbeat", "data": {}}).to_string();
    assert!(ServerEvent::from_json(&text).unwrap().is_none());
  }

  #[test]
  fn malformed_payload_is_an_error() {
    let text = json!({"event": "alert", "data": {"message": "no track"}}).to_string();
    assert!(ServerEvent::from_json(&text).is_err());
  }

  #[test]
  fn intent_envelope_has_null_data() {
    let json: Value = serde_json::from_str(&ClientIntent::PauseDetection.to_json().unwrap()).unwrap();
    assert_eq!(json["event"], "pause_detection");
    assert!(json["data"].is_null());
    assert_eq!(
      ClientIntent::from_name("capture_background"),
      Some(ClientIntent::CaptureBackground)
    );
  }
}
