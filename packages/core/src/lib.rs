//! Core domain types for the job worker system.
//!
//! This crate contains shared types used across all packages:
//! - `JobEnvelope` and `Delivery` for work items leased from a queue
//! - `WorkerConfig`, `SupervisorConfig` and `WorkerState` for worker lifecycle
//! - `QueueService`, the contract every queue backend implements
//! - `MemoryQueue`, an in-process queue backend
//! - Events for observing workers

mod config;
mod events;
mod job;
mod memory;
mod queue;

pub use config::{ConfigError, SupervisorConfig, WorkerConfig, WorkerState};
pub use events::{DropReason, WorkerEvent};
pub use job::{Delivery, JobEnvelope, JobResult, MessageId};
pub use memory::MemoryQueue;
pub use queue::{QueueError, QueueFuture, QueueService};
