//! Configuration for the one-wire bridge.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use thermosight_bridge_framework::{BridgeError, Credentials, LoggingConfig, ZenohConfig};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete bridge configuration.
///
/// Field names follow the host configuration files already deployed on the
/// sensor hosts (`sensorPollFrequency`, `mqtt`, `emon`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneWireBridgeConfig {
    /// Zenoh connection settings. Without connect endpoints the bridge
    /// connects in client mode to the `emon` host.
    #[serde(default)]
    pub zenoh: Option<ZenohConfig>,

    /// Broker topic and credentials
    #[serde(alias = "broker")]
    pub mqtt: BrokerConfig,

    /// Broker host (default: "emon")
    #[serde(default = "default_emon")]
    pub emon: String,

    /// Enable verbose logging
    #[serde(default)]
    pub debug: bool,

    /// Poll interval in milliseconds. Absent or 0 runs a single cycle.
    #[serde(
        default,
        rename = "sensorPollFrequency",
        alias = "poll_interval_ms"
    )]
    pub poll_interval_ms: Option<u64>,

    /// 1-wire temperature probes
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,

    /// Derived metrics computed from cached values
    #[serde(default)]
    pub processes: Vec<ProcessConfig>,

    /// Digital inputs watched for edges
    #[serde(default)]
    pub inputs: Vec<InputConfig>,

    /// Root of the 1-wire device tree
    #[serde(default = "default_w1_root")]
    pub w1_root: PathBuf,

    /// Upper bound on a single sensor read, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Upper bound on a single publish, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub publish_timeout_ms: u64,

    /// Publish running/offline status to `<topic>/@/status`
    #[serde(default)]
    pub status: bool,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_emon() -> String {
    "emon".to_string()
}

fn default_w1_root() -> PathBuf {
    PathBuf::from("/sys/bus/w1/devices")
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Broker topic and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Base topic aliases are published under
    pub topic: String,

    /// Broker user name
    #[serde(default)]
    pub username: Option<String>,

    /// Broker password
    #[serde(default)]
    pub password: Option<String>,
}

/// A 1-wire temperature probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Device id as listed under the 1-wire device tree (e.g. "28-0316a2792cff")
    pub id: String,
    /// Name the reading is published under
    pub alias: String,
}

/// A derived metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Metric type (e.g. "water_kw"). Unknown types are reported when evaluated.
    #[serde(rename = "type")]
    pub kind: String,
    /// Name the result is published under
    pub alias: String,
    /// Type-specific parameters
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A digital input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    /// BCM pin number
    pub gpio: u8,
    /// Name the level is published under
    pub alias: String,
}

impl OneWireBridgeConfig {
    /// Interval between the end of one poll cycle and the start of the next.
    ///
    /// `None` means the poller runs a single cycle.
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Upper bound on a single sensor read.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Every alias, in sensor, process, input order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.sensors
            .iter()
            .map(|s| s.alias.as_str())
            .chain(self.processes.iter().map(|p| p.alias.as_str()))
            .chain(self.inputs.iter().map(|i| i.alias.as_str()))
    }

    /// Aliases used by more than one sensor, process or input.
    ///
    /// Collisions are allowed (the last write wins in the value cache) but
    /// are worth a warning at startup.
    pub fn duplicate_aliases(&self) -> Vec<String> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for alias in self.aliases() {
            *counts.entry(alias).or_default() += 1;
        }

        counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(alias, _)| alias.to_string())
            .collect()
    }

    /// Validate the configuration.
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        if self.mqtt.topic.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Broker topic must not be empty".to_string(),
            ));
        }

        for sensor in &self.sensors {
            if sensor.id.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Sensor '{}' has an empty id",
                    sensor.alias
                )));
            }
            if sensor.alias.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Sensor '{}' has an empty alias",
                    sensor.id
                )));
            }
        }

        for process in &self.processes {
            if process.kind.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Process '{}' has an empty type",
                    process.alias
                )));
            }
            if process.alias.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Process of type '{}' has an empty alias",
                    process.kind
                )));
            }
        }

        let mut pins = HashSet::new();
        for input in &self.inputs {
            if input.alias.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Input on GPIO {} has an empty alias",
                    input.gpio
                )));
            }
            if !pins.insert(input.gpio) {
                return Err(ConfigError::Validation(format!(
                    "GPIO {} is configured more than once",
                    input.gpio
                )));
            }
        }

        Ok(())
    }
}

impl thermosight_bridge_framework::BridgeConfig for OneWireBridgeConfig {
    fn zenoh(&self) -> ZenohConfig {
        match &self.zenoh {
            Some(zenoh) if !zenoh.connect.is_empty() => zenoh.clone(),
            _ => ZenohConfig::client_for_host(&self.emon),
        }
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn base_topic(&self) -> &str {
        &self.mqtt.topic
    }

    fn credentials(&self) -> Option<Credentials> {
        match (&self.mqtt.username, &self.mqtt.password) {
            (None, None) => None,
            (username, password) => Some(Credentials {
                username: username.clone().unwrap_or_default(),
                password: password.clone().unwrap_or_default(),
            }),
        }
    }

    fn debug(&self) -> bool {
        self.debug
    }

    fn publish_status(&self) -> bool {
        self.status
    }

    fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    fn validate(&self) -> thermosight_bridge_framework::Result<()> {
        self.validate_config()
            .map_err(|e| BridgeError::validation(e.to_string()))
    }
}
