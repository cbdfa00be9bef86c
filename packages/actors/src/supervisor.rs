//! Supervisor actor for managing all queue workers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use jobs_core::{SupervisorConfig, WorkerEvent};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::messages::{
    ActorError, ActorResult, StartFailures, StopFailures, SupervisorMessage, WorkerStatus,
};
use crate::processor::JobProcessor;
use crate::registry::WorkerRegistry;
use crate::worker_actor::QueueWorker;

/// State for the supervisor actor.
pub struct SupervisorState {
    config: SupervisorConfig,
    workers: WorkerRegistry,
    /// Automatic restart attempts per queue since the worker last stayed up
    /// for a full health check interval.
    restart_attempts: HashMap<String, u32>,
    /// Queues whose automatic restarts ran out; logged once each.
    exhausted: HashSet<String>,
    /// Timer sending `HealthCheck`; `None` while the health check is off.
    health_check: Option<JoinHandle<()>>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl SupervisorState {
    fn emit(&self, event: WorkerEvent) {
        let _ = self.event_tx.send(event);
    }

    fn status(&self) -> Vec<WorkerStatus> {
        self.workers
            .iter()
            .map(|worker| WorkerStatus {
                queue_name: worker.queue_name().to_string(),
                state: worker.state(),
                restart_attempts: self
                    .restart_attempts
                    .get(worker.queue_name())
                    .copied()
                    .unwrap_or(0),
                exhausted: self.exhausted.contains(worker.queue_name()),
            })
            .collect()
    }

    fn start_health_check(&mut self, myself: &ActorRef<SupervisorMessage>) {
        if self.health_check.is_some() {
            return;
        }

        let period = self.config.health_check_interval();
        let myself_clone = myself.clone();
        self.health_check = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if myself_clone
                    .send_message(SupervisorMessage::HealthCheck)
                    .is_err()
                {
                    break;
                }
            }
        }));
        tracing::debug!(?period, "Health check started");
    }

    fn stop_health_check(&mut self) {
        if let Some(timer) = self.health_check.take() {
            timer.abort();
            tracing::debug!("Health check stopped");
        }
    }
}

/// Supervisor actor arguments.
pub struct SupervisorArgs {
    pub config: SupervisorConfig,
    pub workers: WorkerRegistry,
    pub event_tx: broadcast::Sender<WorkerEvent>,
}

/// Supervisor actor that owns every queue worker.
pub struct Supervisor;

async fn start_all(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
) -> ActorResult<()> {
    tracing::info!(workers = state.workers.len(), "Starting all workers");

    let supervisor = myself.get_cell();
    let results = join_all(state.workers.iter_mut().map(|worker| {
        let name = worker.queue_name().to_string();
        let supervisor = supervisor.clone();
        async move { (name, worker.start(Some(supervisor)).await) }
    }))
    .await;

    let failures: Vec<(String, ActorError)> = results
        .into_iter()
        .filter_map(|(name, result)| result.err().map(|e| (name, e)))
        .collect();

    // Started even with failures, so the failed workers get restarted
    state.start_health_check(myself);

    if failures.is_empty() {
        Ok(())
    } else {
        for (name, err) in &failures {
            tracing::error!(queue = %name, "Worker failed to start: {}", err);
        }
        Err(StartFailures { failures }.into())
    }
}

async fn stop_all(state: &mut SupervisorState) -> ActorResult<()> {
    tracing::info!(workers = state.workers.len(), "Stopping all workers");

    state.stop_health_check();

    let results = join_all(state.workers.iter_mut().map(|worker| {
        let name = worker.queue_name().to_string();
        async move { (name, worker.stop().await) }
    }))
    .await;

    let failures: Vec<(String, ActorError)> = results
        .into_iter()
        .filter_map(|(name, result)| result.err().map(|e| (name, e)))
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        for (name, err) in &failures {
            tracing::error!(queue = %name, "Worker failed to stop: {}", err);
        }
        Err(StopFailures { failures }.into())
    }
}

/// Stop a worker, wait out the grace period, start it again.
///
/// Leaves the restart counter alone; automatic restarts only count as
/// recovered once the worker is still running at a later health check.
async fn restart_worker(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
    queue_name: &str,
) -> ActorResult<()> {
    let grace = state.config.restart_grace();
    let worker = state
        .workers
        .get_mut(queue_name)
        .ok_or_else(|| ActorError::WorkerNotFound(queue_name.to_string()))?;

    worker.stop().await?;
    tokio::time::sleep(grace).await;
    worker.start(Some(myself.get_cell())).await
}

fn reset_restarts(state: &mut SupervisorState, queue_name: &str) {
    state.restart_attempts.remove(queue_name);
    state.exhausted.remove(queue_name);
}

async fn health_check(myself: &ActorRef<SupervisorMessage>, state: &mut SupervisorState) {
    // A tick queued before `stop_all` turned the health check off
    if state.health_check.is_none() {
        return;
    }

    // Still up one full interval after a restart: the restart held
    let recovered: Vec<String> = state
        .workers
        .iter()
        .filter(|worker| {
            worker.is_running()
                && state
                    .restart_attempts
                    .get(worker.queue_name())
                    .is_some_and(|attempts| *attempts > 0)
        })
        .map(|worker| worker.queue_name().to_string())
        .collect();
    for name in recovered {
        tracing::info!(queue = %name, "Worker recovered, restart attempts reset");
        reset_restarts(state, &name);
    }

    let stopped: Vec<String> = state
        .workers
        .iter()
        .filter(|worker| !worker.is_running())
        .map(|worker| worker.queue_name().to_string())
        .collect();

    for name in stopped {
        if !state.config.restart_on_error {
            tracing::warn!(queue = %name, "Worker is not running; automatic restart disabled");
            continue;
        }

        let attempts = state.restart_attempts.get(&name).copied().unwrap_or(0);
        let max = state.config.max_restart_attempts;
        if attempts >= max {
            if state.exhausted.insert(name.clone()) {
                tracing::error!(
                    queue = %name,
                    attempts,
                    "Worker still down after maximum restart attempts, giving up"
                );
                state.emit(WorkerEvent::RestartsExhausted {
                    queue_name: name.clone(),
                    attempts,
                    timestamp: Utc::now(),
                });
            }
            continue;
        }

        let attempt = attempts + 1;
        state.restart_attempts.insert(name.clone(), attempt);
        tracing::warn!(
            queue = %name,
            "Worker is not running, restarting ({}/{})",
            attempt,
            max
        );

        match restart_worker(myself, state, &name).await {
            Ok(()) => {
                tracing::info!(queue = %name, attempt, "Worker restarted");
                state.emit(WorkerEvent::WorkerRestarted {
                    queue_name: name,
                    attempt,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                tracing::error!(queue = %name, attempt, "Restart failed: {}", e);
            }
        }
    }
}

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(workers = ?args.workers.names(), "Starting worker supervisor");

        let mut workers = args.workers;
        for worker in workers.iter_mut() {
            worker.set_event_sender(args.event_tx.clone());
        }

        Ok(SupervisorState {
            config: args.config,
            workers,
            restart_attempts: HashMap::new(),
            exhausted: HashSet::new(),
            health_check: None,
            event_tx: args.event_tx,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::StartAll { reply } => {
                let result = start_all(&myself, state).await;
                let _ = reply.send(result);
            }

            SupervisorMessage::StopAll { reply } => {
                let result = stop_all(state).await;
                let _ = reply.send(result);
            }

            SupervisorMessage::RestartWorker { queue_name, reply } => {
                tracing::info!(queue = %queue_name, "Manual restart requested");
                let result = restart_worker(&myself, state, &queue_name).await;
                if result.is_ok() {
                    reset_restarts(state, &queue_name);
                }
                let _ = reply.send(result);
            }

            SupervisorMessage::RegisterProcessor {
                queue_name,
                job_type,
                processor,
                reply,
            } => {
                let result = match state.workers.get(&queue_name) {
                    Some(worker) => {
                        worker.register_processor(job_type, processor);
                        Ok(())
                    }
                    None => Err(ActorError::WorkerNotFound(queue_name)),
                };
                let _ = reply.send(result);
            }

            SupervisorMessage::Status { reply } => {
                let _ = reply.send(state.status());
            }

            SupervisorMessage::HealthCheck => {
                health_check(&myself, state).await;
            }

            SupervisorMessage::Shutdown { reply } => {
                tracing::info!("Shutting down supervisor");
                let result = stop_all(state).await;
                let _ = reply.send(result);
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.stop_health_check();
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorFailed(cell, err) => {
                if let Some(worker) = state.workers.find_by_actor(&cell) {
                    tracing::error!(queue = %worker.queue_name(), "Worker crashed: {}", err);
                    worker.mark_stopped();
                }
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                if let Some(worker) = state.workers.find_by_actor(&cell) {
                    tracing::warn!(
                        queue = %worker.queue_name(),
                        "Worker terminated unexpectedly: {:?}",
                        reason
                    );
                    worker.mark_stopped();
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Handle for talking to a running supervisor.
pub struct SupervisorHandle {
    actor: ActorRef<SupervisorMessage>,
    join: JoinHandle<()>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl std::fmt::Debug for SupervisorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorHandle")
            .field("actor", &self.actor.get_id())
            .finish_non_exhaustive()
    }
}

impl SupervisorHandle {
    async fn request<T>(
        &self,
        message: impl FnOnce(RpcReplyPort<T>) -> SupervisorMessage,
    ) -> ActorResult<T>
    where
        T: Send + 'static,
    {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(message(tx.into()))
            .map_err(|e| ActorError::Messaging(e.to_string()))?;
        rx.await
            .map_err(|_| ActorError::Messaging("supervisor dropped the reply".into()))
    }

    /// Start every worker and the health check.
    ///
    /// Workers that fail to start do not prevent the others; their errors
    /// come back together as [`StartFailures`].
    pub async fn start_all(&self) -> ActorResult<()> {
        self.request(|reply| SupervisorMessage::StartAll { reply })
            .await?
    }

    /// Stop the health check, then every worker, waiting for in-flight jobs.
    pub async fn stop_all(&self) -> ActorResult<()> {
        self.request(|reply| SupervisorMessage::StopAll { reply })
            .await?
    }

    /// Restart one worker and reset its restart counter.
    pub async fn restart_worker(&self, queue_name: impl Into<String>) -> ActorResult<()> {
        let queue_name = queue_name.into();
        self.request(|reply| SupervisorMessage::RestartWorker { queue_name, reply })
            .await?
    }

    /// Register a processor on the worker for `queue_name`.
    pub async fn register_processor(
        &self,
        queue_name: impl Into<String>,
        job_type: impl Into<String>,
        processor: Arc<dyn JobProcessor>,
    ) -> ActorResult<()> {
        let queue_name = queue_name.into();
        let job_type = job_type.into();
        self.request(|reply| SupervisorMessage::RegisterProcessor {
            queue_name,
            job_type,
            processor,
            reply,
        })
        .await?
    }

    /// Per-worker status, sorted by queue name.
    pub async fn status(&self) -> ActorResult<Vec<WorkerStatus>> {
        self.request(|reply| SupervisorMessage::Status { reply })
            .await
    }

    /// Receive worker and job events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    pub fn actor(&self) -> &ActorRef<SupervisorMessage> {
        &self.actor
    }

    /// Stop all workers, then the supervisor, and wait for it to exit.
    pub async fn shutdown(self) -> ActorResult<()> {
        let result = self
            .request(|reply| SupervisorMessage::Shutdown { reply })
            .await;

        if let Err(e) = self.join.await {
            tracing::warn!("Supervisor task ended abnormally: {}", e);
        }

        result?
    }
}

/// Start a supervisor owning `workers`.
///
/// Rejects two workers on the same queue. With `auto_start` the workers are
/// started right away; start failures are logged and left to the health
/// check.
pub async fn start_supervisor(
    config: SupervisorConfig,
    workers: Vec<QueueWorker>,
) -> ActorResult<SupervisorHandle> {
    config.validate()?;
    let workers = WorkerRegistry::from_workers(workers)?;
    let auto_start = config.auto_start;

    let (event_tx, _) = broadcast::channel(1024);
    let args = SupervisorArgs {
        config,
        workers,
        event_tx: event_tx.clone(),
    };

    let (actor, join) = Actor::spawn(None, Supervisor, args)
        .await
        .map_err(|e| ActorError::Spawn(e.to_string()))?;

    let handle = SupervisorHandle {
        actor,
        join,
        event_tx,
    };

    if auto_start && let Err(e) = handle.start_all().await {
        tracing::warn!("Not every worker started: {}", e);
    }

    Ok(handle)
}
