//! Registry of the workers owned by a supervisor.

use std::collections::BTreeMap;

use ractor::ActorCell;

use crate::messages::{ActorError, ActorResult};
use crate::worker_actor::QueueWorker;

/// Workers keyed by queue name, one worker per queue.
///
/// Owned by the supervisor actor's state; only its message handlers touch it.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<String, QueueWorker>,
}

impl WorkerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, rejecting two workers on the same queue.
    pub fn from_workers(workers: impl IntoIterator<Item = QueueWorker>) -> ActorResult<Self> {
        let mut registry = Self::new();
        for worker in workers {
            registry.insert(worker)?;
        }
        Ok(registry)
    }

    /// Register a worker under its queue name.
    pub fn insert(&mut self, worker: QueueWorker) -> ActorResult<()> {
        let name = worker.queue_name().to_string();
        if self.workers.contains_key(&name) {
            return Err(ActorError::DuplicateWorker(name));
        }
        self.workers.insert(name, worker);
        Ok(())
    }

    pub fn get(&self, queue_name: &str) -> Option<&QueueWorker> {
        self.workers.get(queue_name)
    }

    pub fn get_mut(&mut self, queue_name: &str) -> Option<&mut QueueWorker> {
        self.workers.get_mut(queue_name)
    }

    /// Find the worker whose actor is `cell`.
    pub fn find_by_actor(&mut self, cell: &ActorCell) -> Option<&mut QueueWorker> {
        self.workers.values_mut().find(|w| w.owns_actor(cell))
    }

    /// List all registered queue names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.workers.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueWorker> {
        self.workers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut QueueWorker> {
        self.workers.values_mut()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
