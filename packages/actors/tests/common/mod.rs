#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::{JobProcessor, ProcessResult, ProcessorFuture, QueueWorker};
use jobs_core::{
    Delivery, JobEnvelope, JobResult, MemoryQueue, MessageId, QueueError, QueueFuture,
    QueueService, WorkerConfig,
};
use serde_json::{Value, json};

/// A queue-service call seen by [`RecordingQueue`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Ensure,
    Dequeue { delivered: bool },
    Ack(MessageId),
    Nack(MessageId, Duration),
}

/// Wraps a [`MemoryQueue`] and records every call made against it.
#[derive(Default)]
pub struct RecordingQueue {
    inner: MemoryQueue,
    calls: Mutex<Vec<Call>>,
    ensure_failures: AtomicU32,
    dequeue_panics: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `times` calls to `ensure_queue` fail.
    pub fn fail_ensure(&self, times: u32) {
        self.ensure_failures.store(times, Ordering::SeqCst);
    }

    /// Make the next `times` calls to `dequeue` panic, crashing the worker
    /// actor that polls.
    pub fn panic_on_dequeue(&self, times: u32) {
        self.dequeue_panics.store(times, Ordering::SeqCst);
    }

    pub async fn push(&self, queue_name: &str, job_type: &str) -> MessageId {
        self.inner
            .enqueue(queue_name, JobEnvelope::new(job_type, json!({ "client_id": "c-1" })))
            .await
            .expect("enqueue")
    }

    pub async fn len(&self, queue_name: &str) -> usize {
        self.inner.len(queue_name).await
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn ensure_count(&self) -> usize {
        self.count(|call| matches!(call, Call::Ensure))
    }

    pub fn dequeue_count(&self) -> usize {
        self.count(|call| matches!(call, Call::Dequeue { .. }))
    }

    pub fn acks(&self) -> usize {
        self.count(|call| matches!(call, Call::Ack(_)))
    }

    pub fn nacks(&self) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Nack(_, delay) => Some(delay),
                _ => None,
            })
            .collect()
    }

    /// Most jobs held between dequeue and ack/nack at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn count(&self, filter: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| filter(call)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn settle(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl QueueService for RecordingQueue {
    fn ensure_queue<'a>(&'a self, queue_name: &'a str) -> QueueFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::Ensure);
            let failing = self
                .ensure_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                Err(QueueError::Backend(format!("queue '{}' unreachable", queue_name)))
            } else {
                Ok(())
            }
        })
    }

    fn enqueue<'a>(
        &'a self,
        queue_name: &'a str,
        envelope: JobEnvelope,
    ) -> QueueFuture<'a, MessageId> {
        self.inner.enqueue(queue_name, envelope)
    }

    fn dequeue<'a>(
        &'a self,
        queue_name: &'a str,
        visibility_timeout: Duration,
    ) -> QueueFuture<'a, Option<Delivery>> {
        Box::pin(async move {
            let panicking = self
                .dequeue_panics
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if panicking {
                self.record(Call::Dequeue { delivered: false });
                panic!("queue '{}' connection reset", queue_name);
            }
            let delivery = self.inner.dequeue(queue_name, visibility_timeout).await?;
            self.record(Call::Dequeue {
                delivered: delivery.is_some(),
            });
            if delivery.is_some() {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            }
            Ok(delivery)
        })
    }

    fn ack<'a>(&'a self, queue_name: &'a str, message_id: MessageId) -> QueueFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::Ack(message_id));
            self.settle();
            self.inner.ack(queue_name, message_id).await
        })
    }

    fn nack<'a>(
        &'a self,
        queue_name: &'a str,
        message_id: MessageId,
        redelivery_delay: Duration,
    ) -> QueueFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::Nack(message_id, redelivery_delay));
            self.settle();
            self.inner.nack(queue_name, message_id, redelivery_delay).await
        })
    }
}

/// Scripted processor that counts every call.
#[derive(Default)]
pub struct ScriptedProcessor {
    pub reject: bool,
    pub fail: bool,
    pub fail_on_success: bool,
    /// How long `process` takes.
    pub work: Duration,
    pub validations: AtomicU32,
    pub processed: AtomicU32,
    pub successes: AtomicU32,
    pub errors: AtomicU32,
    /// Number of acks the queue had recorded when `on_success` ran.
    pub acks_seen_on_success: Mutex<Vec<usize>>,
    queue: Option<Arc<RecordingQueue>>,
}

impl ScriptedProcessor {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject: true,
            ..Default::default()
        })
    }

    pub fn slow(work: Duration) -> Arc<Self> {
        Arc::new(Self {
            work,
            ..Default::default()
        })
    }

    /// Succeeds, but the success hook fails; remembers the ack count it saw.
    pub fn with_failing_hook(queue: Arc<RecordingQueue>) -> Arc<Self> {
        Arc::new(Self {
            fail_on_success: true,
            queue: Some(queue),
            ..Default::default()
        })
    }

    pub fn processed(&self) -> u32 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> u32 {
        self.errors.load(Ordering::SeqCst)
    }
}

impl JobProcessor for ScriptedProcessor {
    fn validate<'a>(&'a self, _payload: &'a Value) -> ProcessorFuture<'a, bool> {
        Box::pin(async move {
            self.validations.fetch_add(1, Ordering::SeqCst);
            !self.reject
        })
    }

    fn process<'a>(&'a self, _payload: &'a Value) -> ProcessorFuture<'a, ProcessResult> {
        Box::pin(async move {
            self.processed.fetch_add(1, Ordering::SeqCst);
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            if self.fail {
                Err("client ledger locked".to_string())
            } else {
                Ok(JobResult::new("done"))
            }
        })
    }

    fn on_success<'a>(
        &'a self,
        _result: &'a JobResult,
        _payload: &'a Value,
    ) -> ProcessorFuture<'a, Result<(), String>> {
        Box::pin(async move {
            self.successes.fetch_add(1, Ordering::SeqCst);
            if let Some(ref queue) = self.queue {
                self.acks_seen_on_success
                    .lock()
                    .expect("acks lock")
                    .push(queue.acks());
            }
            if self.fail_on_success {
                Err("receipt mailer down".to_string())
            } else {
                Ok(())
            }
        })
    }

    fn on_error<'a>(
        &'a self,
        _error: &'a str,
        _payload: &'a Value,
    ) -> ProcessorFuture<'a, Result<(), String>> {
        Box::pin(async move {
            self.errors.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Worker config with a one second poll interval and otherwise defaults.
pub fn config(queue_name: &str) -> WorkerConfig {
    WorkerConfig::new(queue_name).with_poll_interval(Duration::from_secs(1))
}

pub fn worker(
    queue: &Arc<RecordingQueue>,
    config: WorkerConfig,
    job_type: &str,
    processor: Arc<ScriptedProcessor>,
) -> QueueWorker {
    let worker = QueueWorker::new(config, queue.clone());
    worker.register_processor(job_type, processor);
    worker
}

/// Let spawned actors run until the paused clock has moved by `duration`.
pub async fn run_for(duration: Duration) {
    tokio::time::sleep(duration).await;
}
