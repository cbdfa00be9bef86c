//! Event types for observing workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MessageId;

/// Why a job was acknowledged without succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// No processor is registered for the job type.
    Unroutable,
    /// The processor's validation rejected the payload.
    Invalid,
    /// Processing failed on the last allowed delivery.
    Exhausted,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Unroutable => write!(f, "unroutable"),
            DropReason::Invalid => write!(f, "invalid"),
            DropReason::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Events emitted by workers and the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    // Worker lifecycle
    WorkerStarted {
        queue_name: String,
        timestamp: DateTime<Utc>,
    },
    WorkerStopped {
        queue_name: String,
        timestamp: DateTime<Utc>,
    },
    /// The supervisor brought a stopped worker back.
    WorkerRestarted {
        queue_name: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// The supervisor gave up restarting a worker.
    RestartsExhausted {
        queue_name: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    // Job outcomes
    JobCompleted {
        queue_name: String,
        message_id: MessageId,
        job_type: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A failed job was nacked and will be redelivered.
    JobRetrying {
        queue_name: String,
        message_id: MessageId,
        job_type: String,
        delivery_count: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A job was acked without succeeding.
    JobDropped {
        queue_name: String,
        message_id: MessageId,
        job_type: String,
        reason: DropReason,
        timestamp: DateTime<Utc>,
    },
}

impl WorkerEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            WorkerEvent::WorkerStarted { timestamp, .. }
            | WorkerEvent::WorkerStopped { timestamp, .. }
            | WorkerEvent::WorkerRestarted { timestamp, .. }
            | WorkerEvent::RestartsExhausted { timestamp, .. }
            | WorkerEvent::JobCompleted { timestamp, .. }
            | WorkerEvent::JobRetrying { timestamp, .. }
            | WorkerEvent::JobDropped { timestamp, .. } => *timestamp,
        }
    }

    pub fn queue_name(&self) -> &str {
        match self {
            WorkerEvent::WorkerStarted { queue_name, .. }
            | WorkerEvent::WorkerStopped { queue_name, .. }
            | WorkerEvent::WorkerRestarted { queue_name, .. }
            | WorkerEvent::RestartsExhausted { queue_name, .. }
            | WorkerEvent::JobCompleted { queue_name, .. }
            | WorkerEvent::JobRetrying { queue_name, .. }
            | WorkerEvent::JobDropped { queue_name, .. } => queue_name,
        }
    }

    /// Get the message ID associated with this event, if any.
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            WorkerEvent::JobCompleted { message_id, .. }
            | WorkerEvent::JobRetrying { message_id, .. }
            | WorkerEvent::JobDropped { message_id, .. } => Some(*message_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            WorkerEvent::WorkerStarted { queue_name, .. } => {
                format!("Worker '{}' started", queue_name)
            }
            WorkerEvent::WorkerStopped { queue_name, .. } => {
                format!("Worker '{}' stopped", queue_name)
            }
            WorkerEvent::WorkerRestarted {
                queue_name,
                attempt,
                ..
            } => format!("Worker '{}' restarted (attempt {})", queue_name, attempt),
            WorkerEvent::RestartsExhausted {
                queue_name,
                attempts,
                ..
            } => format!(
                "Worker '{}' left stopped after {} restart attempts",
                queue_name, attempts
            ),
            WorkerEvent::JobCompleted {
                message_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", message_id, duration_ms),
            WorkerEvent::JobRetrying {
                message_id,
                delivery_count,
                error,
                ..
            } => format!(
                "Job {} failed on delivery {}: {} (will retry)",
                message_id, delivery_count, error
            ),
            WorkerEvent::JobDropped {
                message_id, reason, ..
            } => format!("Job {} dropped: {}", message_id, reason),
        }
    }
}
