//! Reading publisher.

use std::sync::Arc;
use std::time::Duration;

use thermosight_common::{TopicResolver, format_value};

use crate::broker::Broker;
use crate::cache::ValueCache;
use crate::config::DEFAULT_PUBLISH_TIMEOUT;
use crate::error::{BridgeError, Result};

/// Publisher for sending readings to the broker.
///
/// This is the single path from the bridge to the broker. Every publish
/// resolves the alias to a topic, formats the value as a decimal string and
/// records it in the [`ValueCache`]. The cache is updated even when the
/// publish attempt fails: it holds the last value computed, not the last
/// value delivered.
#[derive(Clone)]
pub struct Publisher {
    broker: Arc<dyn Broker>,
    topics: TopicResolver,
    cache: ValueCache,
    timeout: Duration,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("topics", &self.topics)
            .field("cache_entries", &self.cache.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Publisher {
    /// Create a new publisher.
    pub fn new(broker: Arc<dyn Broker>, base_topic: impl Into<String>, cache: ValueCache) -> Self {
        Self {
            broker,
            topics: TopicResolver::new(base_topic),
            cache,
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    /// Bound each publish by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the base topic.
    pub fn base_topic(&self) -> &str {
        self.topics.base()
    }

    /// Get the topic resolver.
    pub fn topics(&self) -> &TopicResolver {
        &self.topics
    }

    /// Get the value cache this publisher writes to.
    pub fn cache(&self) -> &ValueCache {
        &self.cache
    }

    /// Build the topic for an alias.
    pub fn build_topic(&self, alias: &str) -> String {
        self.topics.resolve(alias)
    }

    /// Publish a reading for `alias`.
    pub async fn publish(&self, alias: &str, value: f64) -> Result<()> {
        let topic = self.build_topic(alias);
        let payload = format_value(value);

        tracing::debug!(topic = %topic, value = %payload, "Publishing");

        self.cache.set(alias, value);
        self.put_with_timeout(topic, payload).await
    }

    /// Publish raw text to a full topic (for status messages, etc.).
    ///
    /// Does not touch the value cache.
    pub async fn publish_raw(&self, topic: &str, payload: String) -> Result<()> {
        self.put_with_timeout(topic.to_string(), payload).await
    }

    /// Publish a JSON value to a full topic.
    pub async fn publish_json<T: serde::Serialize>(&self, topic: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        self.publish_raw(topic, payload).await
    }

    async fn put_with_timeout(&self, topic: String, payload: String) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.broker.put(&topic, payload)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::PublishTimeout {
                key: topic,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}
