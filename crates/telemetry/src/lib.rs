//! Logging setup shared by the console binaries.

pub mod logging;

pub use logging::{init_structured_logging, init_with_service, LogConfig, LogFormat};
pub use tracing_appender::non_blocking::WorkerGuard;
