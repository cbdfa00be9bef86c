//! Job processor trait and registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use jobs_core::JobResult;
use serde_json::Value;

/// Result type for `process`.
pub type ProcessResult = Result<JobResult, String>;

/// Result type for the success and error hooks.
pub type HookResult = Result<(), String>;

/// Future type for async processor calls.
pub type ProcessorFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for job processors.
///
/// Implement this trait to define how jobs of a specific type are processed.
/// Only `process` is required; the other methods default to accepting every
/// payload and doing nothing on completion.
pub trait JobProcessor: Send + Sync + 'static {
    /// Check the payload before processing. Returning `false` drops the job
    /// without running it.
    fn validate<'a>(&'a self, _payload: &'a Value) -> ProcessorFuture<'a, bool> {
        Box::pin(async { true })
    }

    /// Process a job and return the result.
    fn process<'a>(&'a self, payload: &'a Value) -> ProcessorFuture<'a, ProcessResult>;

    /// Called after a successful `process`, before the job is acknowledged.
    fn on_success<'a>(
        &'a self,
        _result: &'a JobResult,
        _payload: &'a Value,
    ) -> ProcessorFuture<'a, HookResult> {
        Box::pin(async { Ok::<(), String>(()) })
    }

    /// Called after a failed `process`, before the retry decision.
    fn on_error<'a>(
        &'a self,
        _error: &'a str,
        _payload: &'a Value,
    ) -> ProcessorFuture<'a, HookResult> {
        Box::pin(async { Ok::<(), String>(()) })
    }
}

/// Registry for job processors.
///
/// Maps job types to their processors for dynamic dispatch. Registration
/// takes `&self` so processors can be added while the owning worker runs.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: RwLock<HashMap<String, Arc<dyn JobProcessor>>>,
}

impl ProcessorRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor for a job type, replacing any earlier one.
    ///
    /// Returns the processor that was replaced.
    pub fn register(
        &self,
        job_type: impl Into<String>,
        processor: Arc<dyn JobProcessor>,
    ) -> Option<Arc<dyn JobProcessor>> {
        let job_type = job_type.into();
        let previous = self
            .processors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_type.clone(), processor);

        if previous.is_some() {
            tracing::warn!(job_type = %job_type, "Replaced existing processor");
        } else {
            tracing::debug!(job_type = %job_type, "Registered processor");
        }

        previous
    }

    /// Get a processor for a job type.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobProcessor>> {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_type)
            .cloned()
    }

    /// Check if a processor exists for a job type.
    pub fn has_processor(&self, job_type: &str) -> bool {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(job_type)
    }

    /// List all registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }
}

/// A simple function-based job processor.
///
/// The closure receives an owned copy of the payload.
pub struct FnProcessor<F>
where
    F: Fn(Value) -> ProcessorFuture<'static, ProcessResult> + Send + Sync + 'static,
{
    process: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(Value) -> ProcessorFuture<'static, ProcessResult> + Send + Sync + 'static,
{
    /// Create a new function-based processor.
    pub fn new(process: F) -> Self {
        Self { process }
    }
}

impl<F> JobProcessor for FnProcessor<F>
where
    F: Fn(Value) -> ProcessorFuture<'static, ProcessResult> + Send + Sync + 'static,
{
    fn process<'a>(&'a self, payload: &'a Value) -> ProcessorFuture<'a, ProcessResult> {
        (self.process)(payload.clone())
    }
}

/// Helper macro for creating job processors from async blocks.
#[macro_export]
macro_rules! job_processor {
    (|$payload:ident| $body:expr) => {
        $crate::FnProcessor::new(|$payload: ::serde_json::Value| {
            Box::pin(async move { $body })
        })
    };
}
