//! ThermoSight Common Library
//!
//! This crate provides shared types and utilities for ThermoSight sensor bridges:
//!
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`session`] - Zenoh session management
//! - [`topic`] - Alias to topic resolution
//! - [`value`] - Payload formatting for published readings
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod session;
pub mod topic;
pub mod value;

// Re-export commonly used types at the crate root
pub use config::{
    Credentials, DEFAULT_ZENOH_PORT, LogFormat, LoggingConfig, ZenohConfig, parse_config,
};
pub use error::{Error, Result};
pub use session::{connect, connect_with_credentials};
pub use topic::{TopicResolver, resolve_topic};
pub use value::{current_timestamp_millis, format_value};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Example
///
/// ```ignore
/// use thermosight_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
