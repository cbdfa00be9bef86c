//! Job domain types for work items pulled from a queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of one stored message, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Ulid);

impl MessageId {
    /// Create a new unique message ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a message ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The typed unit of work stored in a queue.
///
/// `job_type` selects the processor; the payload is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    /// Discriminant used to route the job to a processor.
    pub job_type: String,
    /// Processor-specific payload.
    pub payload: serde_json::Value,
    /// When the producer enqueued the job.
    pub enqueued_at: DateTime<Utc>,
}

impl JobEnvelope {
    /// Create an envelope stamped with the current time.
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            enqueued_at: Utc::now(),
        }
    }
}

/// A single delivery of a message, handed out by `QueueService::dequeue`.
///
/// The handle is owned by the worker that dequeued it until the message is
/// acked or nacked.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message_id: MessageId,
    pub envelope: JobEnvelope,
    /// How many times the message has been read, including this delivery.
    pub delivery_count: u32,
}

impl Delivery {
    pub fn job_type(&self) -> &str {
        &self.envelope.job_type
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.envelope.payload
    }

    /// Whether this delivery is the last one the retry budget allows.
    pub fn is_final_attempt(&self, max_retries: u32) -> bool {
        self.delivery_count >= max_retries
    }
}

/// Result of a successfully processed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Human-readable summary of the result.
    pub summary: String,
    /// Optional structured output data as JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl JobResult {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            output: None,
        }
    }

    pub fn with_output(summary: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            summary: summary.into(),
            output: Some(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delivery(count: u32) -> Delivery {
        Delivery {
            message_id: MessageId::new(),
            envelope: JobEnvelope::new("tax.calculate", json!({"client": 7})),
            delivery_count: count,
        }
    }

    #[test]
    fn message_id_parses_its_display_form() {
        let id = MessageId::new();
        let parsed = MessageId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(MessageId::parse("not-a-ulid").is_err());
    }

    #[test]
    fn final_attempt_is_reached_at_max_retries() {
        assert!(!delivery(1).is_final_attempt(3));
        assert!(!delivery(2).is_final_attempt(3));
        assert!(delivery(3).is_final_attempt(3));
        assert!(delivery(4).is_final_attempt(3));
    }

    #[test]
    fn zero_retries_makes_every_delivery_final() {
        assert!(delivery(1).is_final_attempt(0));
    }

    #[test]
    fn envelope_serializes_type_and_payload() {
        let envelope = JobEnvelope::new("notify.email", json!({"to": "ops@firm.test"}));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["job_type"], "notify.email");
        assert_eq!(value["payload"]["to"], "ops@firm.test");
        assert!(value["enqueued_at"].is_string());
    }

    #[test]
    fn job_result_omits_missing_output() {
        let value = serde_json::to_value(JobResult::new("done")).unwrap();
        assert!(value.get("output").is_none());

        let with_output = JobResult::with_output("done", json!({"rows": 3}));
        assert_eq!(with_output.output, Some(json!({"rows": 3})));
    }
}
