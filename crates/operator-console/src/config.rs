use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConsoleError, Result};

/// Which screen the binary drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleMode {
    Dashboard,
    Zones,
    Settings,
}

impl FromStr for ConsoleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dashboard" => Ok(ConsoleMode::Dashboard),
            "zones" => Ok(ConsoleMode::Zones),
            "settings" => Ok(ConsoleMode::Settings),
            _ => Err(format!("Invalid console mode: {}", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mode: ConsoleMode,
    pub server_url: String,
    pub ws_url: String,
    pub http_timeout: Duration,
    /// Wait between push channel connection attempts.
    pub reconnect_delay: Duration,
    /// How long a stop intent is given before leaving the page.
    pub stop_grace: Duration,
    /// Upper bound for deferred device selection.
    pub enumeration_timeout: Duration,
    pub notice_ttl: Duration,
    /// Delay before returning to the dashboard after a config save.
    pub redirect_delay: Duration,
    pub container_width: u32,
    pub overlay_font: Option<PathBuf>,
    pub overlay_out: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server_url = env::var("CONSOLE_SERVER_URL")
            .unwrap_or_else(|_| "http://localhost:5000".to_string());
        let server_url = server_url.trim_end_matches('/').to_string();
        let ws_url = match env::var("CONSOLE_WS_URL") {
            Ok(url) => url,
            Err(_) => derive_ws_url(&server_url)?,
        };

        Ok(Self {
            mode: env_parse("CONSOLE_MODE", ConsoleMode::Dashboard)?,
            server_url,
            ws_url,
            http_timeout: Duration::from_secs(env_parse("CONSOLE_HTTP_TIMEOUT_SECS", 30)?),
            reconnect_delay: Duration::from_millis(env_parse("CONSOLE_RECONNECT_MS", 2000)?),
            stop_grace: Duration::from_millis(env_parse("CONSOLE_STOP_GRACE_MS", 500)?),
            enumeration_timeout: Duration::from_secs(env_parse("CONSOLE_ENUM_TIMEOUT_SECS", 5)?),
            notice_ttl: Duration::from_secs(env_parse("CONSOLE_NOTICE_TTL_SECS", 5)?),
            redirect_delay: Duration::from_millis(env_parse("CONSOLE_REDIRECT_DELAY_MS", 1000)?),
            container_width: env_parse("CONSOLE_CONTAINER_WIDTH", 1280)?,
            overlay_font: env::var("CONSOLE_OVERLAY_FONT").ok().map(PathBuf::from),
            overlay_out: env::var("CONSOLE_OVERLAY_OUT").ok().map(PathBuf::from),
        })
    }

    /// Defaults pointed at `server_url`, used by tests and embedders.
    pub fn for_server(server_url: impl Into<String>) -> Result<Self> {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        let ws_url = derive_ws_url(&server_url)?;
        Ok(Self {
            mode: ConsoleMode::Dashboard,
            server_url,
            ws_url,
            http_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(2),
            stop_grace: Duration::from_millis(500),
            enumeration_timeout: Duration::from_secs(5),
            notice_ttl: Duration::from_secs(5),
            redirect_delay: Duration::from_millis(1000),
            container_width: 1280,
            overlay_font: None,
            overlay_out: None,
        })
    }
}

/// `http://host:port` -> `ws://host:port/ws`, `https` -> `wss`.
pub fn derive_ws_url(server_url: &str) -> Result<String> {
    let base = server_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        Ok(format!("wss://{}/ws", rest))
    } else if let Some(rest) = base.strip_prefix("http://") {
        Ok(format!("ws://{}/ws", rest))
    } else {
        Err(ConsoleError::config(format!(
            "server url must start with http:// or https://, got {}",
            server_url
        )))
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConsoleError::config(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}
