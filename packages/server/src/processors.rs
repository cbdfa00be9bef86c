//! Demo processors registered on every worker.
//!
//! Handy for exercising a deployment: `echo` returns its payload, `sleep`
//! holds a job for a while and `fail` exercises the retry path.

use std::sync::Arc;
use std::time::Duration;

use actors::{JobProcessor, ProcessResult, ProcessorFuture, QueueWorker, job_processor};
use jobs_core::JobResult;
use serde_json::Value;

/// Longest a `sleep` job may ask for.
pub const MAX_SLEEP_SECS: u64 = 300;

/// Sleeps for `seconds` (default 5).
pub struct SleepProcessor;

impl SleepProcessor {
    fn seconds(payload: &Value) -> Option<u64> {
        match payload.get("seconds") {
            None => Some(5),
            Some(value) => value.as_u64(),
        }
    }
}

impl JobProcessor for SleepProcessor {
    fn validate<'a>(&'a self, payload: &'a Value) -> ProcessorFuture<'a, bool> {
        Box::pin(async move { Self::seconds(payload).is_some_and(|s| s <= MAX_SLEEP_SECS) })
    }

    fn process<'a>(&'a self, payload: &'a Value) -> ProcessorFuture<'a, ProcessResult> {
        Box::pin(async move {
            let seconds = Self::seconds(payload).unwrap_or(5);
            tracing::info!("Sleeping for {} seconds", seconds);
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            Ok(JobResult::new(format!("Slept for {} seconds", seconds)))
        })
    }
}

/// Fails unless the payload carries `"fail": false`.
pub struct FailProcessor;

impl JobProcessor for FailProcessor {
    fn process<'a>(&'a self, payload: &'a Value) -> ProcessorFuture<'a, ProcessResult> {
        Box::pin(async move {
            let should_fail = payload.get("fail").and_then(Value::as_bool).unwrap_or(true);
            if should_fail {
                Err("Intentional failure".to_string())
            } else {
                Ok(JobResult::new("Success"))
            }
        })
    }

    fn on_error<'a>(
        &'a self,
        error: &'a str,
        payload: &'a Value,
    ) -> ProcessorFuture<'a, Result<(), String>> {
        Box::pin(async move {
            tracing::info!(payload = %payload, "fail job reported: {}", error);
            Ok(())
        })
    }
}

/// Register `echo`, `sleep` and `fail` on a worker.
pub fn register_demo_processors(worker: &QueueWorker) {
    worker.register_processor(
        "echo",
        Arc::new(job_processor!(|payload| {
            tracing::info!("Echo job: {}", payload);
            Ok(JobResult::with_output("Echo completed", payload))
        })),
    );
    worker.register_processor("sleep", Arc::new(SleepProcessor));
    worker.register_processor("fail", Arc::new(FailProcessor));
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobs_core::{MemoryQueue, WorkerConfig};
    use serde_json::json;

    fn demo_worker() -> QueueWorker {
        let worker = QueueWorker::new(
            WorkerConfig::new("documents"),
            Arc::new(MemoryQueue::default()),
        );
        register_demo_processors(&worker);
        worker
    }

    #[test]
    fn registers_all_demo_types() {
        let worker = demo_worker();
        assert_eq!(
            worker.processors().job_types(),
            vec!["echo".to_string(), "fail".to_string(), "sleep".to_string()]
        );
    }

    #[tokio::test]
    async fn echo_returns_payload() {
        let worker = demo_worker();
        let echo = worker.processors().get("echo").expect("echo registered");
        let payload = json!({ "client_id": "c-42" });

        let result = echo.process(&payload).await.expect("echo succeeds");
        assert_eq!(result.output, Some(payload));
    }

    #[tokio::test]
    async fn sleep_validates_seconds() {
        let sleep = SleepProcessor;
        assert!(sleep.validate(&json!({})).await);
        assert!(sleep.validate(&json!({ "seconds": 2 })).await);
        assert!(!sleep.validate(&json!({ "seconds": "two" })).await);
        assert!(!sleep.validate(&json!({ "seconds": MAX_SLEEP_SECS + 1 })).await);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_waits_requested_time() {
        let started = tokio::time::Instant::now();
        let result = SleepProcessor
            .process(&json!({ "seconds": 3 }))
            .await
            .expect("sleep succeeds");

        assert_eq!(result.summary, "Slept for 3 seconds");
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn fail_honours_flag() {
        assert!(FailProcessor.process(&json!({})).await.is_err());
        assert!(FailProcessor.process(&json!({ "fail": false })).await.is_ok());
    }
}
