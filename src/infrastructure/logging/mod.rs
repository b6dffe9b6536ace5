//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output on stderr
//! - Optional rolling JSON log files via tracing-appender
//! - `RUST_LOG` overrides through `EnvFilter`
//!
//! Security rejections (forged or replayed callbacks) are logged under the
//! `security` target so they can be filtered or routed separately.

pub mod config;
pub mod logger;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
