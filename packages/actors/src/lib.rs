//! Actor system for the job worker.
//!
//! This crate provides the Ractor-based engine that polls queues, runs job
//! processors and keeps the workers alive.
//!
//! # Architecture
//!
//! - `Supervisor` - Top-level actor that owns the queue workers, starts and
//!   stops them together and restarts stopped ones from a health check
//! - `WorkerActor` - Polls a single queue and settles each job with ack/nack
//! - `QueueWorker` - Handle that owns a worker's config, processors and actor
//!
//! # Usage
//!
//! ```ignore
//! use actors::{QueueWorker, start_supervisor};
//!
//! let worker = QueueWorker::new(WorkerConfig::new("notifications"), queue)
//!     .with_processor("send-email", SendEmail::default());
//!
//! let supervisor = start_supervisor(SupervisorConfig::default(), vec![worker]).await?;
//! // ...
//! supervisor.shutdown().await?;
//! ```

mod execution;
mod messages;
mod processor;
mod registry;
mod supervisor;
mod worker_actor;

pub use execution::{JobContext, JobOutcome};
pub use messages::{
    ActorError, ActorResult, StartFailures, StopFailures, SupervisorMessage, WorkerMessage,
    WorkerStatus,
};
pub use processor::{
    FnProcessor, HookResult, JobProcessor, ProcessResult, ProcessorFuture, ProcessorRegistry,
};
pub use registry::WorkerRegistry;
pub use supervisor::{Supervisor, SupervisorArgs, SupervisorHandle, start_supervisor};
pub use worker_actor::{QueueWorker, WorkerActor, WorkerArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, ActorStatus, RpcReplyPort, concurrency};
