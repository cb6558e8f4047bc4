//! Operator console for a remote intrusion detection server.
//!
//! The server does all detection work. The console mirrors its pushed
//! state, forwards operator intent, edits the detection configuration and
//! edits the restricted zones drawn over the video.

pub mod api;
pub mod canvas;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod frame;
pub mod notify;
pub mod overlay;
pub mod readiness;
pub mod settings;
pub mod socket;
pub mod zones;

pub use api::{ApiClient, ConsoleApi};
pub use config::{Config, ConsoleMode};
pub use dashboard::{Dashboard, NavigationDecision, RunState};
pub use error::{ConsoleError, Result};
pub use settings::{SettingsController, SettingsForm};
pub use socket::{ChannelEvent, IntentSink, PushChannel};
pub use zones::{SaveOutcome, ZoneEditor};
