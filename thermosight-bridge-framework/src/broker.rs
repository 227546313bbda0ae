//! Broker client abstraction.

use async_trait::async_trait;

use crate::error::{BridgeError, Result};

/// Destination for published readings.
///
/// The bridge only ever asks the broker to "publish this now"; delivery
/// guarantees beyond a single attempt belong to the implementation.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish `payload` under `topic`.
    async fn put(&self, topic: &str, payload: String) -> Result<()>;
}

#[async_trait]
impl Broker for zenoh::Session {
    async fn put(&self, topic: &str, payload: String) -> Result<()> {
        zenoh::Session::put(self, topic, payload)
            .await
            .map_err(|e| BridgeError::Publish {
                key: topic.to_string(),
                message: e.to_string(),
            })
    }
}
