//! In-process broker that records publishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::broker::Broker;
use crate::error::{BridgeError, Result};

/// Broker that keeps every `(topic, payload)` pair in memory.
///
/// Used when embedding a bridge without a network and in tests. Clones
/// share the same message log.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    messages: Arc<Mutex<Vec<(String, String)>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every recorded message, in publish order.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().clone()
    }

    /// Payloads recorded for one topic, in publish order.
    pub fn payloads_for(&self, topic: &str) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Forget every recorded message.
    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn put(&self, topic: &str, payload: String) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BridgeError::Publish {
                key: topic.to_string(),
                message: "broker unavailable".to_string(),
            });
        }

        self.messages.lock().push((topic.to_string(), payload));
        Ok(())
    }
}
