pub mod detection_config;
pub mod devices;
pub mod events;
pub mod rtsp;
pub mod validation;
pub mod zones;

pub use detection_config::{DetectionConfig, RtspTransport, SourceType};
pub use events::{ClientIntent, DetectionStats, ServerEvent};
pub use zones::{Point, Zone, ZonesPayload};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
