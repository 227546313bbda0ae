//! Bridge status reporting.

use serde::{Deserialize, Serialize};
use thermosight_common::current_timestamp_millis;

use crate::Result;
use crate::publisher::Publisher;

/// Lifecycle state reported in a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Running,
    Offline,
}

/// Status message published to `<base topic>/@/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name (e.g., "onewire").
    pub bridge: String,
    pub version: String,
    pub status: BridgeState,
    /// Unix epoch milliseconds when the status was produced.
    pub timestamp: i64,
    /// Bridge-specific fields, flattened into the message.
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeStatus {
    pub fn new(bridge: impl Into<String>, version: impl Into<String>, status: BridgeState) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status,
            timestamp: current_timestamp_millis(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach bridge-specific fields. `metadata` must be a JSON object.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Publish this status under the publisher's status topic.
    pub async fn publish(&self, publisher: &Publisher) -> Result<()> {
        let topic = publisher.topics().status_topic();
        publisher.publish_json(&topic, self).await
    }
}

/// Helper to publish bridge status on startup and shutdown.
pub struct StatusPublisher {
    publisher: Publisher,
    bridge_name: String,
    version: String,
}

impl StatusPublisher {
    /// Create a new status publisher.
    pub fn new(
        publisher: Publisher,
        bridge_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            bridge_name: bridge_name.into(),
            version: version.into(),
        }
    }

    /// Publish "running" status with optional metadata.
    pub async fn publish_running(&self, metadata: Option<serde_json::Value>) -> Result<()> {
        let mut status = self.status(BridgeState::Running);
        if let Some(meta) = metadata {
            status = status.with_metadata(meta);
        }
        status.publish(&self.publisher).await
    }

    /// Publish "offline" status.
    pub async fn publish_offline(&self) -> Result<()> {
        self.status(BridgeState::Offline)
            .publish(&self.publisher)
            .await
    }

    fn status(&self, state: BridgeState) -> BridgeStatus {
        BridgeStatus::new(&self.bridge_name, &self.version, state)
    }
}
