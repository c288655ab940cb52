//! Event publishing.
//!
//! Like events and batch counts leave the engine through [`EventPublisher`].
//! [`InMemoryEventQueue`] keeps them in process for embedding and tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::cache::lock::mutex_lock;
use crate::domain::types::CounterScope;

const SOURCE: &str = "application::events";

pub const LIKE_CREATED_TOPIC: &str = "like.created";

/// Queue other services push [`LikeCommand`](crate::domain::likes::LikeCommand)s onto.
pub const LIKE_REQUEST_TOPIC: &str = "like.request";

const BATCH_COUNT_TOPIC_PREFIX: &str = "like.batch_count";

/// Topic carrying the batch counts of one counter scope.
pub fn batch_count_topic(scope: CounterScope) -> String {
    format!("{BATCH_COUNT_TOPIC_PREFIX}.{}", scope.as_str())
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode payload for `{topic}`")]
    Encode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to publish to `{topic}`: {message}")]
    Transport { topic: String, message: String },
}

impl PublishError {
    pub fn transport(topic: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            topic: topic.into(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PublishError>;
}

/// Serializes `payload` and publishes it to `topic`.
pub async fn publish_json<P>(
    publisher: &dyn EventPublisher,
    topic: &str,
    payload: &P,
) -> Result<(), PublishError>
where
    P: Serialize + ?Sized,
{
    let payload = serde_json::to_value(payload).map_err(|source| PublishError::Encode {
        topic: topic.to_string(),
        source,
    })?;
    publisher.publish(topic, payload).await
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub topic: String,
    pub payload: Value,
}

/// FIFO of published events.
#[derive(Debug, Default)]
pub struct InMemoryEventQueue {
    queue: Mutex<VecDeque<PublishedEvent>>,
}

impl InMemoryEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes up to `limit` events in publish order.
    pub fn drain(&self, limit: usize) -> Vec<PublishedEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        queue.drain(..count).collect()
    }

    /// Removes every event published to `topic`, keeping the rest queued.
    pub fn drain_topic(&self, topic: &str) -> Vec<PublishedEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain_topic");
        let (matched, rest): (VecDeque<_>, VecDeque<_>) =
            queue.drain(..).partition(|event| event.topic == topic);
        *queue = rest;
        matched.into()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventQueue {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PublishError> {
        debug!(
            target = "kudos::application::events",
            topic, "Event enqueued in memory"
        );
        mutex_lock(&self.queue, SOURCE, "publish").push_back(PublishedEvent {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}
