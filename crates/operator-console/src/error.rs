use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("server reported an error: {0}")]
    Server(String),

    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("push channel error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("push channel closed")]
    ChannelClosed,

    #[error("frame decode failed: {0}")]
    Frame(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ConsoleError {
    pub fn status(endpoint: impl Into<String>, status: reqwest::StatusCode) -> Self {
        Self::Status {
            endpoint: endpoint.into(),
            status: status.as_u16(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<base64::DecodeError> for ConsoleError {
    fn from(err: base64::DecodeError) -> Self {
        ConsoleError::Frame(format!("invalid base64: {}", err))
    }
}

impl From<image::ImageError> for ConsoleError {
    fn from(err: image::ImageError) -> Self {
        ConsoleError::Frame(err.to_string())
    }
}

pub type Result<T, E = ConsoleError> = std::result::Result<T, E>;
