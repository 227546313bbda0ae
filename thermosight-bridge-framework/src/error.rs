//! Error types for the bridge framework.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in a bridge.
///
/// Only configuration and connection errors are fatal; everything raised
/// once the bridge is running is logged by the caller and skipped.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// The broker session could not be opened.
    #[error("Zenoh connection error: {0}")]
    ZenohConnection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The broker rejected a publish.
    #[error("Failed to publish to {key}: {message}")]
    Publish { key: String, message: String },

    /// The broker did not accept a publish in time.
    #[error("Publish to {key} timed out after {timeout_ms}ms")]
    PublishTimeout { key: String, timeout_ms: u64 },

    /// A shutdown callback returned an error or panicked.
    #[error("Shutdown callback '{name}' failed: {message}")]
    ShutdownCallback { name: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<thermosight_common::Error> for BridgeError {
    fn from(err: thermosight_common::Error) -> Self {
        match err {
            thermosight_common::Error::Config(msg) => Self::Config(msg),
            thermosight_common::Error::Zenoh(e) => Self::ZenohConnection(e.to_string()),
            thermosight_common::Error::Json(e) => Self::Serialization(e.to_string()),
            thermosight_common::Error::Io(e) => Self::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_common_error() {
        let err: BridgeError = thermosight_common::Error::Config("bad mode".to_string()).into();
        assert!(matches!(err, BridgeError::Config(msg) if msg == "bad mode"));
    }
}
