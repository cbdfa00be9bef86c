//! Message and error types for actor communication.

use std::sync::Arc;

use jobs_core::{ConfigError, QueueError, WorkerState};
use ractor::RpcReplyPort;
use serde::Serialize;

use crate::processor::JobProcessor;

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run one poll cycle.
    Poll,
}

/// Messages for the Supervisor.
pub enum SupervisorMessage {
    /// Start every worker, then the health check.
    StartAll {
        reply: RpcReplyPort<Result<(), ActorError>>,
    },

    /// Stop the health check, then every worker.
    StopAll {
        reply: RpcReplyPort<Result<(), ActorError>>,
    },

    /// Stop a worker, wait the grace period and start it again.
    RestartWorker {
        queue_name: String,
        reply: RpcReplyPort<Result<(), ActorError>>,
    },

    /// Register a processor on a worker.
    RegisterProcessor {
        queue_name: String,
        job_type: String,
        processor: Arc<dyn JobProcessor>,
        reply: RpcReplyPort<Result<(), ActorError>>,
    },

    /// Get per-worker status.
    Status {
        reply: RpcReplyPort<Vec<WorkerStatus>>,
    },

    /// Periodic health check tick.
    HealthCheck,

    /// Stop all workers and the supervisor itself.
    Shutdown {
        reply: RpcReplyPort<Result<(), ActorError>>,
    },
}

impl std::fmt::Debug for SupervisorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorMessage::StartAll { .. } => write!(f, "StartAll"),
            SupervisorMessage::StopAll { .. } => write!(f, "StopAll"),
            SupervisorMessage::RestartWorker { queue_name, .. } => {
                write!(f, "RestartWorker({})", queue_name)
            }
            SupervisorMessage::RegisterProcessor {
                queue_name,
                job_type,
                ..
            } => write!(f, "RegisterProcessor({}, {})", queue_name, job_type),
            SupervisorMessage::Status { .. } => write!(f, "Status"),
            SupervisorMessage::HealthCheck => write!(f, "HealthCheck"),
            SupervisorMessage::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}

/// Snapshot of one worker as seen by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub queue_name: String,
    pub state: WorkerState,
    pub restart_attempts: u32,
    /// Automatic restarts were given up for this worker.
    pub exhausted: bool,
}

/// Result type for internal operations.
pub type ActorResult<T> = Result<T, ActorError>;

/// Error type for actor operations.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    #[error("Worker already registered: {0}")]
    DuplicateWorker(String),

    #[error("Failed to spawn actor: {0}")]
    Spawn(String),

    #[error("Messaging error: {0}")]
    Messaging(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Start(#[from] StartFailures),

    #[error(transparent)]
    Stop(#[from] StopFailures),
}

/// Workers that failed to start during `start_all`.
#[derive(Debug, thiserror::Error)]
#[error("{} worker(s) failed to start: {}", .failures.len(), describe(.failures))]
pub struct StartFailures {
    pub failures: Vec<(String, ActorError)>,
}

/// Workers that failed to stop during `stop_all`.
#[derive(Debug, thiserror::Error)]
#[error("{} worker(s) failed to stop: {}", .failures.len(), describe(.failures))]
pub struct StopFailures {
    pub failures: Vec<(String, ActorError)>,
}

fn describe(failures: &[(String, ActorError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{}: {}", name, err))
        .collect::<Vec<_>>()
        .join("; ")
}
