/*!
 * # Notifications
 *
 * Customer email and SMS for confirmations and reminders. Callers go
 * through [`NotificationDispatcher::notify`], which enqueues a job and
 * falls back to delivering it directly when the queue is unavailable.
 */

pub mod channels;
pub mod delivery;
pub mod scheduler;
pub mod templates;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::message_queue::{Message, MessageQueue, MessageQueueError};

pub use delivery::DirectSender;

/// Queue topic carrying [`NotificationJob`] payloads.
pub const NOTIFICATION_TOPIC: &str = "notifications";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    BookingConfirmation,
    DropOffReminder,
    PickupConfirmation,
    PickupReminder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingConfirmation => "booking_confirmation",
            NotificationKind::DropOffReminder => "drop_off_reminder",
            NotificationKind::PickupConfirmation => "pickup_confirmation",
            NotificationKind::PickupReminder => "pickup_reminder",
        }
    }
}

/// `entity_id` is a pickup request id for `PickupConfirmation` and a booking id otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub kind: NotificationKind,
    pub entity_id: i32,
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("queue error: {0}")]
    Queue(#[from] MessageQueueError),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("{0} channel is not configured")]
    NotConfigured(&'static str),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, job: &NotificationJob) -> Result<(), NotificationError>;
}

/// Hands jobs to the background worker through the message queue.
pub struct QueueSender {
    queue: Arc<dyn MessageQueue>,
}

impl QueueSender {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl NotificationSender for QueueSender {
    async fn send(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        let message = Message::new(NOTIFICATION_TOPIC, serde_json::to_value(job)?);
        debug!(message_id = %message.id, kind = %job.kind, "enqueueing notification");
        self.queue.publish(message).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    primary: Arc<dyn NotificationSender>,
    fallback: Arc<dyn NotificationSender>,
    breaker: Arc<CircuitBreaker>,
}

impl NotificationDispatcher {
    pub fn new(
        primary: Arc<dyn NotificationSender>,
        fallback: Arc<dyn NotificationSender>,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            breaker: Arc::new(CircuitBreaker::new("notification_queue", breaker)),
        }
    }

    /// Schedules delivery of `kind` for `entity_id`. Never fails; problems are logged.
    pub async fn notify(&self, kind: NotificationKind, entity_id: i32) {
        let job = NotificationJob { kind, entity_id };
        let primary = Arc::clone(&self.primary);

        match self.breaker.call(|| async move { primary.send(&job).await }).await {
            Ok(()) => {
                counter!("rentals.notifications.enqueued", 1, "kind" => kind.as_str());
            }
            Err(err) => {
                warn!(error = %err, kind = %kind, entity_id, "notification queue unavailable, delivering directly");
                counter!("rentals.notifications.fallback", 1, "kind" => kind.as_str());

                let fallback = Arc::clone(&self.fallback);
                tokio::spawn(async move {
                    if let Err(e) = fallback.send(&job).await {
                        error!(error = %e, kind = %job.kind, entity_id = job.entity_id, "direct notification delivery failed");
                    }
                });
            }
        }
    }
}

/// Pops and delivers one queued job. Returns `false` when the queue was empty.
pub async fn process_next(
    queue: &dyn MessageQueue,
    sender: &dyn NotificationSender,
) -> Result<bool, NotificationError> {
    let Some(message) = queue.subscribe(NOTIFICATION_TOPIC).await? else {
        return Ok(false);
    };

    let job: NotificationJob = match serde_json::from_value(message.payload.clone()) {
        Ok(job) => job,
        Err(e) => {
            warn!(message_id = %message.id, error = %e, "discarding malformed notification job");
            queue.ack(&message.id).await?;
            return Ok(true);
        }
    };

    match sender.send(&job).await {
        Ok(()) => queue.ack(&message.id).await?,
        Err(e) => {
            warn!(message_id = %message.id, kind = %job.kind, error = %e, retry = message.retry_count, "notification delivery failed");
            queue.nack(message).await?;
        }
    }
    Ok(true)
}

/// Drains the notification topic into `sender` until the task is aborted.
pub async fn run_worker(
    queue: Arc<dyn MessageQueue>,
    sender: Arc<dyn NotificationSender>,
    idle_delay: Duration,
) {
    info!("notification worker started");
    loop {
        match process_next(queue.as_ref(), sender.as_ref()).await {
            Ok(true) => {}
            Ok(false) => tokio::time::sleep(idle_delay).await,
            Err(e) => {
                error!(error = %e, "notification worker error");
                tokio::time::sleep(idle_delay).await;
            }
        }
    }
}
