//! Configuration traits and utilities.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};
use crate::{Credentials, LoggingConfig, ZenohConfig};

/// Default time allowed for a single publish.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_millis(1000);

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's configuration struct to get
/// automatic loading, validation, and access to common config fields.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use thermosight_bridge_framework::{BridgeConfig, ZenohConfig, LoggingConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyBridgeConfig {
///     pub zenoh: ZenohConfig,
///     pub logging: LoggingConfig,
///     pub topic: String,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn zenoh(&self) -> ZenohConfig {
///         self.zenoh.clone()
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn base_topic(&self) -> &str {
///         &self.topic
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the Zenoh configuration used to reach the broker.
    fn zenoh(&self) -> ZenohConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Get the base topic aliases are published under.
    fn base_topic(&self) -> &str;

    /// Credentials presented to the broker, if any.
    fn credentials(&self) -> Option<Credentials> {
        None
    }

    /// Whether verbose logging was requested in the configuration.
    fn debug(&self) -> bool {
        false
    }

    /// Whether running/offline status messages should be published.
    fn publish_status(&self) -> bool {
        false
    }

    /// Upper bound on a single publish.
    fn publish_timeout(&self) -> Duration {
        DEFAULT_PUBLISH_TIMEOUT
    }

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Logging configuration after applying the `debug` flag and an optional
    /// CLI override, in that order of increasing precedence.
    fn effective_logging(&self, cli_level: Option<&str>) -> LoggingConfig {
        let mut logging = self.logging().clone();
        if self.debug() {
            logging.level = "debug".to_string();
        }
        if let Some(level) = cli_level {
            logging.level = level.to_string();
        }
        logging
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a JSON5 string.
    fn parse(content: &str) -> Result<Self> {
        let config: Self = thermosight_common::parse_config(content)
            .map_err(|e| BridgeError::ConfigParse(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        zenoh: ZenohConfig,
        #[serde(default)]
        logging: LoggingConfig,
        topic: String,
        #[serde(default)]
        debug: bool,
    }

    impl BridgeConfig for TestConfig {
        fn zenoh(&self) -> ZenohConfig {
            self.zenoh.clone()
        }

        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }

        fn base_topic(&self) -> &str {
            &self.topic
        }

        fn debug(&self) -> bool {
            self.debug
        }

        fn validate(&self) -> Result<()> {
            if self.topic.is_empty() {
                return Err(BridgeError::validation("topic must not be empty"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_config_not_found() {
        let result = TestConfig::load("/nonexistent/path.json5");
        assert!(matches!(result, Err(BridgeError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ topic: 'house', logging: {{ level: 'warn' }} }}").unwrap();

        let config = TestConfig::load(file.path()).unwrap();
        assert_eq!(config.base_topic(), "house");
        assert_eq!(config.logging().level, "warn");
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let result = TestConfig::parse("{ topic: '' }");
        assert!(matches!(result, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_parse_error() {
        let result = TestConfig::parse("{ topic: ");
        assert!(matches!(result, Err(BridgeError::ConfigParse(_))));
    }

    #[test]
    fn test_effective_logging_precedence() {
        let config = TestConfig::parse("{ topic: 'house', debug: true }").unwrap();

        assert_eq!(config.effective_logging(None).level, "debug");
        assert_eq!(config.effective_logging(Some("trace")).level, "trace");

        let quiet = TestConfig::parse("{ topic: 'house' }").unwrap();
        assert_eq!(quiet.effective_logging(None).level, "info");
        assert!(quiet.credentials().is_none());
        assert_eq!(quiet.publish_timeout(), DEFAULT_PUBLISH_TIMEOUT);
    }
}
