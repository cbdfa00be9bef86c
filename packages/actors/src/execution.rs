//! Per-job execution: fetch, route, validate, process and settle.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use jobs_core::{Delivery, DropReason, JobResult, QueueService, WorkerConfig, WorkerEvent};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::processor::{JobProcessor, ProcessorRegistry};

/// How one fetch-and-process attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The queue had nothing visible.
    Idle,
    /// Processed and acknowledged.
    Completed,
    /// Failed and returned to the queue for another delivery.
    Retrying,
    /// Acknowledged without succeeding.
    Dropped(DropReason),
}

/// Everything one worker needs to run a job.
pub struct JobContext {
    pub config: WorkerConfig,
    pub queue: Arc<dyn QueueService>,
    pub processors: Arc<ProcessorRegistry>,
    pub events: Option<broadcast::Sender<WorkerEvent>>,
}

impl JobContext {
    fn queue_name(&self) -> &str {
        &self.config.queue_name
    }

    fn emit(&self, event: WorkerEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    /// Fetch one message and take it to ack or nack.
    pub async fn run_once(&self) -> JobOutcome {
        let delivery = match self
            .queue
            .dequeue(self.queue_name(), self.config.visibility_timeout())
            .await
        {
            Ok(Some(delivery)) => delivery,
            Ok(None) => return JobOutcome::Idle,
            Err(e) => {
                tracing::warn!(queue = %self.queue_name(), "Dequeue failed: {}", e);
                return JobOutcome::Idle;
            }
        };

        let Some(processor) = self.processors.get(delivery.job_type()) else {
            tracing::error!(
                queue = %self.queue_name(),
                message_id = %delivery.message_id,
                job_type = %delivery.job_type(),
                "No processor for job type, dropping"
            );
            return self.drop_job(&delivery, DropReason::Unroutable).await;
        };

        match guarded(processor.validate(delivery.payload())).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::error!(
                    queue = %self.queue_name(),
                    message_id = %delivery.message_id,
                    job_type = %delivery.job_type(),
                    "Payload failed validation, dropping"
                );
                return self.drop_job(&delivery, DropReason::Invalid).await;
            }
            Err(panic) => {
                let error = format!("validate panicked: {}", panic);
                return self.fail(&delivery, processor.as_ref(), error).await;
            }
        }

        let started = Instant::now();
        let result = match guarded(processor.process(delivery.payload())).await {
            Ok(result) => result,
            Err(panic) => Err(format!("process panicked: {}", panic)),
        };

        match result {
            Ok(job_result) => {
                self.complete(&delivery, processor.as_ref(), job_result, started)
                    .await
            }
            Err(error) => self.fail(&delivery, processor.as_ref(), error).await,
        }
    }

    async fn complete(
        &self,
        delivery: &Delivery,
        processor: &dyn JobProcessor,
        result: JobResult,
        started: Instant,
    ) -> JobOutcome {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match guarded(processor.on_success(&result, delivery.payload())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                message_id = %delivery.message_id,
                "on_success hook failed: {}", e
            ),
            Err(panic) => tracing::warn!(
                message_id = %delivery.message_id,
                "on_success hook panicked: {}", panic
            ),
        }

        self.ack(delivery).await;

        tracing::info!(
            queue = %self.queue_name(),
            message_id = %delivery.message_id,
            job_type = %delivery.job_type(),
            duration_ms,
            "Job completed: {}", result.summary
        );
        self.emit(WorkerEvent::JobCompleted {
            queue_name: self.queue_name().to_string(),
            message_id: delivery.message_id,
            job_type: delivery.job_type().to_string(),
            duration_ms,
            timestamp: Utc::now(),
        });

        JobOutcome::Completed
    }

    async fn fail(
        &self,
        delivery: &Delivery,
        processor: &dyn JobProcessor,
        error: String,
    ) -> JobOutcome {
        match guarded(processor.on_error(&error, delivery.payload())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                message_id = %delivery.message_id,
                "on_error hook failed: {}", e
            ),
            Err(panic) => tracing::warn!(
                message_id = %delivery.message_id,
                "on_error hook panicked: {}", panic
            ),
        }

        if delivery.is_final_attempt(self.config.max_retries) {
            tracing::error!(
                queue = %self.queue_name(),
                message_id = %delivery.message_id,
                job_type = %delivery.job_type(),
                delivery_count = delivery.delivery_count,
                "Job failed on final attempt, dropping: {}", error
            );
            return self.drop_job(delivery, DropReason::Exhausted).await;
        }

        tracing::warn!(
            queue = %self.queue_name(),
            message_id = %delivery.message_id,
            job_type = %delivery.job_type(),
            delivery_count = delivery.delivery_count,
            "Job failed, will retry: {}", error
        );

        if let Err(e) = self
            .queue
            .nack(
                self.queue_name(),
                delivery.message_id,
                self.config.redelivery_delay(),
            )
            .await
        {
            tracing::warn!(
                message_id = %delivery.message_id,
                "Nack failed, message returns after its lease: {}", e
            );
        }

        self.emit(WorkerEvent::JobRetrying {
            queue_name: self.queue_name().to_string(),
            message_id: delivery.message_id,
            job_type: delivery.job_type().to_string(),
            delivery_count: delivery.delivery_count,
            error,
            timestamp: Utc::now(),
        });

        JobOutcome::Retrying
    }

    async fn drop_job(&self, delivery: &Delivery, reason: DropReason) -> JobOutcome {
        self.ack(delivery).await;
        self.emit(WorkerEvent::JobDropped {
            queue_name: self.queue_name().to_string(),
            message_id: delivery.message_id,
            job_type: delivery.job_type().to_string(),
            reason,
            timestamp: Utc::now(),
        });
        JobOutcome::Dropped(reason)
    }

    async fn ack(&self, delivery: &Delivery) {
        if let Err(e) = self.queue.ack(self.queue_name(), delivery.message_id).await {
            tracing::warn!(
                message_id = %delivery.message_id,
                "Ack failed, message returns after its lease: {}", e
            );
        }
    }
}

/// Run a processor call, turning a panic into its message.
async fn guarded<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(panic_message)
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
