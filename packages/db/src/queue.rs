//! Queue service backed by SurrealDB.

use std::time::Duration;

use chrono::Utc;
use jobs_core::{Delivery, JobEnvelope, MessageId, QueueError, QueueFuture, QueueService};
use serde::{Deserialize, Serialize};

use crate::{Database, DbConfig, DbError, connect_db, init_schema};

const TABLE: &str = "queue_message";

/// Candidates read per dequeue; more than one so a lost claim race can fall
/// through to the next visible message.
const CLAIM_CANDIDATES: i64 = 8;

/// Internal record type for SurrealDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageRecord {
    message_id: String,
    queue: String,
    envelope: JobEnvelope,
    delivery_count: u32,
    visible_at_ms: i64,
}

impl MessageRecord {
    fn into_delivery(self) -> Result<Delivery, DbError> {
        let message_id = MessageId::parse(&self.message_id)
            .map_err(|e| DbError::Serialization(format!("bad message id: {}", e)))?;
        Ok(Delivery {
            message_id,
            envelope: self.envelope,
            delivery_count: self.delivery_count,
        })
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn offset_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl From<DbError> for QueueError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Serialization(msg) => QueueError::Serialization(msg),
            other => QueueError::Backend(other.to_string()),
        }
    }
}

/// Queue service storing messages in SurrealDB.
///
/// Leasing is a conditional update: a candidate is claimed only if it is
/// still visible when the update runs, so two consumers racing for the same
/// message cannot both win.
#[derive(Clone)]
pub struct SurrealQueue {
    db: Database,
}

impl SurrealQueue {
    /// Connect with the given configuration and make sure the schema exists.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        let db = connect_db(config).await?;
        init_schema(&db).await?;
        Ok(Self { db })
    }

    /// Wrap an existing connection. The schema must already be initialized.
    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Count stored messages in a queue, leased ones included.
    pub async fn count(&self, queue_name: &str) -> Result<u64, DbError> {
        let mut result = self
            .db
            .query("SELECT count() AS count FROM queue_message WHERE queue = $queue GROUP ALL")
            .bind(("queue", queue_name.to_string()))
            .await?;

        #[derive(Deserialize)]
        struct Count {
            count: i64,
        }

        let counts: Vec<Count> = result.take(0)?;
        Ok(counts.first().map_or(0, |c| c.count.max(0) as u64))
    }

    async fn insert(&self, queue_name: &str, envelope: JobEnvelope) -> Result<MessageId, DbError> {
        let message_id = MessageId::new();
        let record = MessageRecord {
            message_id: message_id.to_string(),
            queue: queue_name.to_string(),
            envelope,
            delivery_count: 0,
            visible_at_ms: now_ms(),
        };

        let created: Option<MessageRecord> = self
            .db
            .create((TABLE, message_id.to_string()))
            .content(record)
            .await?;

        created
            .map(|_| message_id)
            .ok_or_else(|| DbError::Query("Failed to create message".into()))
    }

    async fn lease_next(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<Delivery>, DbError> {
        let now = now_ms();

        let mut result = self
            .db
            .query(
                r#"
                SELECT * FROM queue_message
                WHERE queue = $queue AND visible_at_ms <= $now
                ORDER BY visible_at_ms ASC, message_id ASC
                LIMIT $limit
                "#,
            )
            .bind(("queue", queue_name.to_string()))
            .bind(("now", now))
            .bind(("limit", CLAIM_CANDIDATES))
            .await?;

        let candidates: Vec<MessageRecord> = result.take(0)?;
        let lease_until = now.saturating_add(offset_ms(visibility_timeout));

        for candidate in candidates {
            let mut claim = self
                .db
                .query(
                    r#"
                    UPDATE type::thing("queue_message", $id)
                    SET visible_at_ms = $lease_until, delivery_count += 1
                    WHERE visible_at_ms <= $now
                    RETURN AFTER
                    "#,
                )
                .bind(("id", candidate.message_id.clone()))
                .bind(("lease_until", lease_until))
                .bind(("now", now))
                .await?;

            let claimed: Vec<MessageRecord> = claim.take(0)?;
            match claimed.into_iter().next() {
                Some(record) => return record.into_delivery().map(Some),
                None => {
                    tracing::debug!(
                        message_id = %candidate.message_id,
                        "Message claimed by another consumer"
                    );
                }
            }
        }

        Ok(None)
    }

    async fn remove(&self, queue_name: &str, message_id: MessageId) -> Result<bool, DbError> {
        let mut result = self
            .db
            .query(
                r#"
                DELETE type::thing("queue_message", $id)
                WHERE queue = $queue
                RETURN BEFORE
                "#,
            )
            .bind(("id", message_id.to_string()))
            .bind(("queue", queue_name.to_string()))
            .await?;

        let deleted: Vec<MessageRecord> = result.take(0)?;
        Ok(!deleted.is_empty())
    }

    async fn delay(
        &self,
        queue_name: &str,
        message_id: MessageId,
        delay: Duration,
    ) -> Result<bool, DbError> {
        let visible_at = now_ms().saturating_add(offset_ms(delay));

        let mut result = self
            .db
            .query(
                r#"
                UPDATE type::thing("queue_message", $id)
                SET visible_at_ms = $visible_at
                WHERE queue = $queue
                RETURN AFTER
                "#,
            )
            .bind(("id", message_id.to_string()))
            .bind(("queue", queue_name.to_string()))
            .bind(("visible_at", visible_at))
            .await?;

        let updated: Vec<MessageRecord> = result.take(0)?;
        Ok(!updated.is_empty())
    }
}

impl QueueService for SurrealQueue {
    fn ensure_queue<'a>(&'a self, queue_name: &'a str) -> QueueFuture<'a, ()> {
        Box::pin(async move {
            self.db
                .health()
                .await
                .map_err(|e| QueueError::Backend(format!("queue '{}': {}", queue_name, e)))
        })
    }

    fn enqueue<'a>(
        &'a self,
        queue_name: &'a str,
        envelope: JobEnvelope,
    ) -> QueueFuture<'a, MessageId> {
        Box::pin(async move { Ok(self.insert(queue_name, envelope).await?) })
    }

    fn dequeue<'a>(
        &'a self,
        queue_name: &'a str,
        visibility_timeout: Duration,
    ) -> QueueFuture<'a, Option<Delivery>> {
        Box::pin(async move { Ok(self.lease_next(queue_name, visibility_timeout).await?) })
    }

    fn ack<'a>(&'a self, queue_name: &'a str, message_id: MessageId) -> QueueFuture<'a, ()> {
        Box::pin(async move {
            if self.remove(queue_name, message_id).await? {
                Ok(())
            } else {
                Err(QueueError::MessageNotFound(message_id))
            }
        })
    }

    fn nack<'a>(
        &'a self,
        queue_name: &'a str,
        message_id: MessageId,
        redelivery_delay: Duration,
    ) -> QueueFuture<'a, ()> {
        Box::pin(async move {
            if self.delay(queue_name, message_id, redelivery_delay).await? {
                Ok(())
            } else {
                Err(QueueError::MessageNotFound(message_id))
            }
        })
    }
}
