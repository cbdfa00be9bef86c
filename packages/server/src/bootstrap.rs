//! Wires the queue backend, workers and supervisor together.

use std::sync::Arc;

use actors::{ActorError, QueueWorker, SupervisorHandle, start_supervisor};
use db::{DbError, SurrealQueue};
use jobs_core::QueueService;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::processors::register_demo_processors;

/// Startup errors.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] ActorError),
}

/// Connect the queue backend and start the supervisor with one worker per
/// configured queue.
pub async fn bootstrap(config: &ServerConfig) -> Result<SupervisorHandle, BootstrapError> {
    tracing::info!("Initializing job worker system...");

    let queue: Arc<dyn QueueService> = Arc::new(SurrealQueue::connect(&config.db).await?);

    let workers = config
        .workers
        .iter()
        .map(|worker_config| {
            let worker = QueueWorker::new(worker_config.clone(), queue.clone());
            register_demo_processors(&worker);
            worker
        })
        .collect();

    let supervisor = start_supervisor(config.supervisor.clone(), workers).await?;

    tracing::info!(
        workers = config.workers.len(),
        auto_start = config.supervisor.auto_start,
        "Job worker system initialized"
    );
    Ok(supervisor)
}
