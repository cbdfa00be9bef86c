//! In-process queue service.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{Delivery, JobEnvelope, MessageId, QueueError, QueueFuture, QueueService};

#[derive(Debug)]
struct StoredMessage {
    id: MessageId,
    envelope: JobEnvelope,
    delivery_count: u32,
    visible_at: Instant,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.visible_at <= now
    }
}

/// Queue service kept in process memory.
///
/// Visibility is tracked against the tokio clock, so leases and redelivery
/// delays follow `tokio::time::pause`/`advance` in tests. Messages are handed
/// out in enqueue order among those currently visible.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages in a queue, leased ones included.
    pub async fn len(&self, queue_name: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue_name)
            .map_or(0, |messages| messages.len())
    }

    /// Number of messages a consumer could dequeue right now.
    pub async fn visible_len(&self, queue_name: &str) -> usize {
        let now = Instant::now();
        self.queues.lock().await.get(queue_name).map_or(0, |messages| {
            messages.iter().filter(|m| m.is_visible(now)).count()
        })
    }
}

impl QueueService for MemoryQueue {
    fn enqueue<'a>(
        &'a self,
        queue_name: &'a str,
        envelope: JobEnvelope,
    ) -> QueueFuture<'a, MessageId> {
        Box::pin(async move {
            let id = MessageId::new();
            let mut queues = self.queues.lock().await;
            queues
                .entry(queue_name.to_string())
                .or_default()
                .push(StoredMessage {
                    id,
                    envelope,
                    delivery_count: 0,
                    visible_at: Instant::now(),
                });
            Ok(id)
        })
    }

    fn dequeue<'a>(
        &'a self,
        queue_name: &'a str,
        visibility_timeout: Duration,
    ) -> QueueFuture<'a, Option<Delivery>> {
        Box::pin(async move {
            let now = Instant::now();
            let mut queues = self.queues.lock().await;
            let Some(messages) = queues.get_mut(queue_name) else {
                return Ok(None);
            };

            let Some(message) = messages.iter_mut().find(|m| m.is_visible(now)) else {
                return Ok(None);
            };

            message.delivery_count = message.delivery_count.saturating_add(1);
            message.visible_at = now + visibility_timeout;

            Ok(Some(Delivery {
                message_id: message.id,
                envelope: message.envelope.clone(),
                delivery_count: message.delivery_count,
            }))
        })
    }

    fn ack<'a>(&'a self, queue_name: &'a str, message_id: MessageId) -> QueueFuture<'a, ()> {
        Box::pin(async move {
            let mut queues = self.queues.lock().await;
            let messages = queues
                .get_mut(queue_name)
                .ok_or(QueueError::MessageNotFound(message_id))?;
            let position = messages
                .iter()
                .position(|m| m.id == message_id)
                .ok_or(QueueError::MessageNotFound(message_id))?;
            messages.remove(position);
            Ok(())
        })
    }

    fn nack<'a>(
        &'a self,
        queue_name: &'a str,
        message_id: MessageId,
        redelivery_delay: Duration,
    ) -> QueueFuture<'a, ()> {
        Box::pin(async move {
            let mut queues = self.queues.lock().await;
            let message = queues
                .get_mut(queue_name)
                .and_then(|messages| messages.iter_mut().find(|m| m.id == message_id))
                .ok_or(QueueError::MessageNotFound(message_id))?;
            message.visible_at = Instant::now() + redelivery_delay;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LEASE: Duration = Duration::from_secs(30);

    async fn seeded(queue: &MemoryQueue, job_type: &str) -> MessageId {
        queue
            .enqueue("filings", JobEnvelope::new(job_type, json!({})))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn dequeue_leases_the_message() {
        let queue = MemoryQueue::new();
        let id = seeded(&queue, "tax.file").await;

        let delivery = queue.dequeue("filings", LEASE).await.unwrap().unwrap();
        assert_eq!(delivery.message_id, id);
        assert_eq!(delivery.delivery_count, 1);
        assert_eq!(delivery.job_type(), "tax.file");

        // Leased message is invisible to other consumers.
        assert!(queue.dequeue("filings", LEASE).await.unwrap().is_none());
        assert_eq!(queue.len("filings").await, 1);
        assert_eq!(queue.visible_len("filings").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lease_redelivers_with_higher_count() {
        let queue = MemoryQueue::new();
        let id = seeded(&queue, "tax.file").await;

        queue.dequeue("filings", LEASE).await.unwrap().unwrap();
        tokio::time::advance(LEASE + Duration::from_secs(1)).await;

        let again = queue.dequeue("filings", LEASE).await.unwrap().unwrap();
        assert_eq!(again.message_id, id);
        assert_eq!(again.delivery_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn nack_hides_message_for_the_delay() {
        let queue = MemoryQueue::new();
        let id = seeded(&queue, "tax.file").await;

        queue.dequeue("filings", LEASE).await.unwrap().unwrap();
        queue
            .nack("filings", id, Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(queue.dequeue("filings", LEASE).await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(2)).await;
        let redelivered = queue.dequeue("filings", LEASE).await.unwrap().unwrap();
        assert_eq!(redelivered.delivery_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn ack_removes_and_rejects_unknown_ids() {
        let queue = MemoryQueue::new();
        let id = seeded(&queue, "tax.file").await;

        queue.dequeue("filings", LEASE).await.unwrap().unwrap();
        queue.ack("filings", id).await.unwrap();
        assert_eq!(queue.len("filings").await, 0);

        let missing = queue.ack("filings", id).await;
        assert!(matches!(missing, Err(QueueError::MessageNotFound(m)) if m == id));
        let missing_queue = queue.nack("other", id, LEASE).await;
        assert!(matches!(missing_queue, Err(QueueError::MessageNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn visible_messages_come_out_in_enqueue_order() {
        let queue = MemoryQueue::new();
        let first = seeded(&queue, "a").await;
        let second = seeded(&queue, "b").await;

        let one = queue.dequeue("filings", LEASE).await.unwrap().unwrap();
        let two = queue.dequeue("filings", LEASE).await.unwrap().unwrap();
        assert_eq!(one.message_id, first);
        assert_eq!(two.message_id, second);
        assert!(queue.dequeue("empty", LEASE).await.unwrap().is_none());
    }
}
