//! Worker actor that polls one queue, and the handle that owns it.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use jobs_core::{QueueService, WorkerConfig, WorkerEvent, WorkerState};
use ractor::{Actor, ActorCell, ActorProcessingErr, ActorRef, ActorStatus};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::execution::{JobContext, JobOutcome};
use crate::messages::{ActorError, ActorResult, WorkerMessage};
use crate::processor::{JobProcessor, ProcessorRegistry};

/// State for the worker actor.
pub struct WorkerActorState {
    ctx: Arc<JobContext>,
    state: Arc<watch::Sender<WorkerState>>,
    /// Timer that sends the next `Poll`.
    poll_timer: Option<JoinHandle<()>>,
    cycles: u64,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub ctx: Arc<JobContext>,
    pub state: Arc<watch::Sender<WorkerState>>,
}

/// Worker actor that polls its queue on a fixed-delay timer.
///
/// Each `Poll` runs `concurrency` fetch attempts and waits for all of them
/// before the next `Poll` is scheduled, so a stop request queued behind a
/// cycle only takes effect once the in-flight jobs have settled.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let queue_name = args.ctx.config.queue_name.clone();
        tracing::info!(queue = %queue_name, "Starting worker");

        args.ctx
            .queue
            .ensure_queue(&queue_name)
            .await
            .map_err(|e| {
                ActorProcessingErr::from(format!("Queue '{}' unavailable: {}", queue_name, e))
            })?;

        args.state.send_replace(WorkerState::Running);

        Ok(WorkerActorState {
            ctx: args.ctx,
            state: args.state,
            poll_timer: None,
            cycles: 0,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(ref tx) = state.ctx.events {
            let _ = tx.send(WorkerEvent::WorkerStarted {
                queue_name: state.ctx.config.queue_name.clone(),
                timestamp: Utc::now(),
            });
        }

        // First cycle runs right away
        myself.send_message(WorkerMessage::Poll)?;
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => {
                state.cycles += 1;

                let ctx = state.ctx.as_ref();
                let attempts = (0..ctx.config.concurrency).map(|_| ctx.run_once());
                let outcomes = join_all(attempts).await;

                let handled = outcomes
                    .iter()
                    .filter(|outcome| **outcome != JobOutcome::Idle)
                    .count();
                if handled > 0 {
                    tracing::debug!(
                        queue = %ctx.config.queue_name,
                        cycle = state.cycles,
                        handled,
                        "Poll cycle finished"
                    );
                }

                // Fixed delay: the next cycle is scheduled only after this one settled
                let interval = ctx.config.poll_interval();
                let myself_clone = myself.clone();
                state.poll_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(interval).await;
                    let _ = myself_clone.send_message(WorkerMessage::Poll);
                }));
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(timer) = state.poll_timer.take() {
            timer.abort();
        }
        state.state.send_replace(WorkerState::Stopped);

        tracing::info!(
            queue = %state.ctx.config.queue_name,
            cycles = state.cycles,
            "Worker stopped"
        );
        if let Some(ref tx) = state.ctx.events {
            let _ = tx.send(WorkerEvent::WorkerStopped {
                queue_name: state.ctx.config.queue_name.clone(),
                timestamp: Utc::now(),
            });
        }

        Ok(())
    }
}

/// A queue worker: configuration, processors and the actor polling the queue.
///
/// The handle outlives its actor; `start` spawns a fresh actor each time, so
/// a stopped or crashed worker can be started again.
pub struct QueueWorker {
    config: WorkerConfig,
    queue: Arc<dyn QueueService>,
    processors: Arc<ProcessorRegistry>,
    state: Arc<watch::Sender<WorkerState>>,
    actor: Option<ActorRef<WorkerMessage>>,
    events: Option<broadcast::Sender<WorkerEvent>>,
}

impl QueueWorker {
    /// Create a stopped worker for the configured queue.
    pub fn new(config: WorkerConfig, queue: Arc<dyn QueueService>) -> Self {
        let (state, _) = watch::channel(WorkerState::Stopped);
        Self {
            config,
            queue,
            processors: Arc::new(ProcessorRegistry::new()),
            state: Arc::new(state),
            actor: None,
            events: None,
        }
    }

    /// Register a processor, builder style.
    pub fn with_processor(
        self,
        job_type: impl Into<String>,
        processor: impl JobProcessor,
    ) -> Self {
        self.processors.register(job_type, Arc::new(processor));
        self
    }

    /// Register a processor for a job type. The last registration wins and
    /// applies to the running worker immediately.
    pub fn register_processor(
        &self,
        job_type: impl Into<String>,
        processor: Arc<dyn JobProcessor>,
    ) {
        self.processors.register(job_type, processor);
    }

    /// Send worker and job events to this channel.
    pub fn set_event_sender(&mut self, events: broadcast::Sender<WorkerEvent>) {
        self.events = Some(events);
    }

    pub fn queue_name(&self) -> &str {
        &self.config.queue_name
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// True while the worker polls, false after a stop or a crash.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
            && self.actor.as_ref().is_some_and(|actor| {
                !matches!(
                    actor.get_status(),
                    ActorStatus::Stopping | ActorStatus::Stopped
                )
            })
    }

    /// Whether `cell` is this worker's current actor.
    pub(crate) fn owns_actor(&self, cell: &ActorCell) -> bool {
        self.actor
            .as_ref()
            .is_some_and(|actor| actor.get_id() == cell.get_id())
    }

    /// Start polling. A no-op when already running.
    ///
    /// With a supervisor the actor is linked to it, so a crash reaches the
    /// supervisor as a supervision event.
    pub async fn start(&mut self, supervisor: Option<ActorCell>) -> ActorResult<()> {
        if self.is_running() {
            tracing::info!(queue = %self.config.queue_name, "Worker already running");
            return Ok(());
        }

        self.config.validate()?;
        self.state.send_replace(WorkerState::Starting);

        let args = WorkerArgs {
            ctx: Arc::new(JobContext {
                config: self.config.clone(),
                queue: self.queue.clone(),
                processors: self.processors.clone(),
                events: self.events.clone(),
            }),
            state: self.state.clone(),
        };

        let spawned = match supervisor {
            Some(supervisor) => Actor::spawn_linked(None, WorkerActor, args, supervisor).await,
            None => Actor::spawn(None, WorkerActor, args).await,
        };

        match spawned {
            Ok((actor, _handle)) => {
                self.actor = Some(actor);
                Ok(())
            }
            Err(e) => {
                self.actor = None;
                self.state.send_replace(WorkerState::Stopped);
                tracing::error!(queue = %self.config.queue_name, "Worker failed to start: {}", e);
                Err(ActorError::Spawn(e.to_string()))
            }
        }
    }

    /// Stop polling and wait for in-flight jobs to settle.
    pub async fn stop(&mut self) -> ActorResult<()> {
        let Some(actor) = self.actor.take() else {
            self.state.send_replace(WorkerState::Stopped);
            return Ok(());
        };

        if matches!(actor.get_status(), ActorStatus::Stopped) {
            self.state.send_replace(WorkerState::Stopped);
            return Ok(());
        }

        self.state.send_replace(WorkerState::Stopping);
        tracing::info!(queue = %self.config.queue_name, "Stopping worker");

        let stopped = actor.stop_and_wait(None, None).await;
        self.state.send_replace(WorkerState::Stopped);
        stopped.map_err(|e| ActorError::Messaging(e.to_string()))
    }

    /// Forget an actor that terminated on its own.
    pub(crate) fn mark_stopped(&mut self) {
        self.actor = None;
        self.state.send_replace(WorkerState::Stopped);
    }
}
