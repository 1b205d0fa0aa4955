/*!
 * # Message Queue
 *
 * Durable-ish hand-off between request handlers and background workers.
 * The in-memory backend is the default; the Redis backend keeps one list
 * per topic under a configurable namespace.
 */

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Message queue errors
#[derive(Error, Debug)]
pub enum MessageQueueError {
    #[error("Queue is full")]
    QueueFull,
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl From<redis::RedisError> for MessageQueueError {
    fn from(err: redis::RedisError) -> Self {
        MessageQueueError::ConnectionError(err.to_string())
    }
}

impl From<serde_json::Error> for MessageQueueError {
    fn from(err: serde_json::Error) -> Self {
        MessageQueueError::SerializationError(err.to_string())
    }
}

/// Message envelope for queue items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload,
            timestamp: chrono::Utc::now(),
            retry_count: 0,
            max_retries: 3,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError>;

    /// Pops the next message for `topic`, or `None` when nothing is waiting.
    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, MessageQueueError>;

    async fn ack(&self, message_id: &Uuid) -> Result<(), MessageQueueError>;

    /// Returns a failed message to its topic until its retry budget is spent.
    async fn nack(&self, message: Message) -> Result<(), MessageQueueError>;
}

/// In-memory message queue implementation
#[derive(Debug)]
pub struct InMemoryMessageQueue {
    queues: Mutex<HashMap<String, VecDeque<Message>>>,
    max_size: usize,
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::with_max_size(1000)
    }
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            max_size,
        }
    }

    fn queues(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<Message>>> {
        match self.queues.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn len(&self, topic: &str) -> usize {
        self.queues().get(topic).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError> {
        let mut queues = self.queues();
        let queue = queues.entry(message.topic.clone()).or_default();

        if queue.len() >= self.max_size {
            return Err(MessageQueueError::QueueFull);
        }

        queue.push_back(message);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, MessageQueueError> {
        Ok(self.queues().get_mut(topic).and_then(VecDeque::pop_front))
    }

    async fn ack(&self, _message_id: &Uuid) -> Result<(), MessageQueueError> {
        Ok(())
    }

    async fn nack(&self, mut message: Message) -> Result<(), MessageQueueError> {
        if !message.can_retry() {
            warn!(message_id = %message.id, topic = %message.topic, "dropping message after max retries");
            return Ok(());
        }
        message.retry_count += 1;
        self.publish(message).await
    }
}

/// Redis list-backed queue: LPUSH to publish, BRPOP to consume.
pub struct RedisMessageQueue {
    conn: ConnectionManager,
    namespace: String,
    block_timeout: Duration,
}

impl RedisMessageQueue {
    pub async fn connect(
        client: &redis::Client,
        namespace: impl Into<String>,
        block_timeout: Duration,
    ) -> Result<Self, MessageQueueError> {
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            conn,
            namespace: namespace.into(),
            block_timeout,
        })
    }

    fn key(&self, topic: &str) -> String {
        format!("{}:{}", self.namespace, topic)
    }

    fn dead_letter_key(&self, topic: &str) -> String {
        format!("{}:{}:dead", self.namespace, topic)
    }

    async fn push(&self, key: String, message: &Message) -> Result<(), MessageQueueError> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self.conn.clone();
        redis::cmd("LPUSH")
            .arg(key)
            .arg(payload)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for RedisMessageQueue {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError> {
        let key = self.key(&message.topic);
        self.push(key, &message).await
    }

    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, MessageQueueError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(self.key(topic))
            .arg(self.block_timeout.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        match popped {
            Some((_, raw)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn ack(&self, message_id: &Uuid) -> Result<(), MessageQueueError> {
        debug!(%message_id, "message acknowledged");
        Ok(())
    }

    async fn nack(&self, mut message: Message) -> Result<(), MessageQueueError> {
        if !message.can_retry() {
            warn!(message_id = %message.id, topic = %message.topic, "moving message to dead letter list");
            let key = self.dead_letter_key(&message.topic);
            return self.push(key, &message).await;
        }
        message.retry_count += 1;
        self.publish(message).await
    }
}
