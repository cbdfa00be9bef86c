//! Contract for the message-queue service workers consume.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::{Delivery, JobEnvelope, MessageId};

/// Queue service errors.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),
    #[error("Queue backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Future type returned by queue operations.
pub type QueueFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueueError>> + Send + 'a>>;

/// A message-queue service with visibility-timeout leasing.
///
/// A dequeued message stays invisible to every other consumer until its
/// visibility timeout elapses or it is settled with `ack` or `nack`. Messages
/// whose lease expires are handed out again with a higher delivery count.
pub trait QueueService: Send + Sync + 'static {
    /// Make sure the queue can be consumed. Called whenever a worker starts.
    fn ensure_queue<'a>(&'a self, _queue_name: &'a str) -> QueueFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    /// Store a new message and return its ID.
    fn enqueue<'a>(&'a self, queue_name: &'a str, envelope: JobEnvelope)
    -> QueueFuture<'a, MessageId>;

    /// Lease the next visible message, or return `None` when nothing is visible.
    fn dequeue<'a>(
        &'a self,
        queue_name: &'a str,
        visibility_timeout: Duration,
    ) -> QueueFuture<'a, Option<Delivery>>;

    /// Permanently remove a message.
    fn ack<'a>(&'a self, queue_name: &'a str, message_id: MessageId) -> QueueFuture<'a, ()>;

    /// Return a message to the queue, invisible until `redelivery_delay` elapses.
    fn nack<'a>(
        &'a self,
        queue_name: &'a str,
        message_id: MessageId,
        redelivery_delay: Duration,
    ) -> QueueFuture<'a, ()>;
}
