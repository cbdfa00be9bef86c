//! Worker and supervisor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("queue name must not be empty")]
    EmptyQueueName,
    #[error("worker '{0}': concurrency must be at least 1")]
    ZeroConcurrency(String),
    #[error("worker '{0}': poll interval must be greater than zero")]
    ZeroPollInterval(String),
    #[error("worker '{0}': visibility timeout must be greater than zero")]
    ZeroVisibilityTimeout(String),
    #[error("worker '{0}': redelivery delay must be greater than zero")]
    ZeroRedeliveryDelay(String),
    #[error("supervisor health check interval must be greater than zero")]
    ZeroHealthCheckInterval,
}

/// Lifecycle state of a queue worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Not polling.
    #[default]
    Stopped,
    /// Spawned, waiting for the queue service to answer.
    Starting,
    /// Polling its queue.
    Running,
    /// No further polls; in-flight jobs are draining.
    Stopping,
}

impl WorkerState {
    pub fn is_running(&self) -> bool {
        matches!(self, WorkerState::Running)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Stopped => write!(f, "stopped"),
            WorkerState::Starting => write!(f, "starting"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Configuration for one queue worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Name of the queue this worker consumes.
    pub queue_name: String,
    /// Number of fetch-and-process attempts per poll cycle.
    pub concurrency: u32,
    /// Delay between the end of one poll cycle and the start of the next.
    pub poll_interval_ms: u64,
    /// Delivery count at which a failing job is dropped instead of retried.
    pub max_retries: u32,
    /// How long a dequeued message stays invisible to other consumers.
    pub visibility_timeout_secs: u64,
    /// Flat delay before a nacked message becomes visible again.
    pub redelivery_delay_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_name: "default".to_string(),
            concurrency: 1,
            poll_interval_ms: 1_000,
            max_retries: 3,
            visibility_timeout_secs: 30,
            redelivery_delay_secs: 60,
        }
    }
}

impl WorkerConfig {
    /// Create a configuration for the given queue with default settings.
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            ..Default::default()
        }
    }

    pub fn with_concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = ceil_millis(interval);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout_secs = ceil_secs(timeout);
        self
    }

    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay_secs = ceil_secs(delay);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_secs(self.redelivery_delay_secs)
    }

    /// Check the configuration before a worker is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_name.trim().is_empty() {
            return Err(ConfigError::EmptyQueueName);
        }
        let name = || self.queue_name.clone();
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency(name()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval(name()));
        }
        if self.visibility_timeout_secs == 0 {
            return Err(ConfigError::ZeroVisibilityTimeout(name()));
        }
        // A zero delay would let a permanently failing job spin the poll loop.
        if self.redelivery_delay_secs == 0 {
            return Err(ConfigError::ZeroRedeliveryDelay(name()));
        }
        Ok(())
    }
}

/// Configuration for the worker supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Start every worker as soon as the supervisor is constructed.
    pub auto_start: bool,
    /// Period of the health check loop.
    pub health_check_interval_ms: u64,
    /// Restart workers the health check finds stopped.
    pub restart_on_error: bool,
    /// Automatic restarts allowed per worker before giving up.
    pub max_restart_attempts: u32,
    /// Pause between stopping and starting a worker during a restart.
    pub restart_grace_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            health_check_interval_ms: 30_000,
            restart_on_error: true,
            max_restart_attempts: 3,
            restart_grace_ms: 1_000,
        }
    }
}

impl SupervisorConfig {
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval_ms = ceil_millis(interval);
        self
    }

    pub fn with_restart_on_error(mut self, restart: bool) -> Self {
        self.restart_on_error = restart;
        self
    }

    pub fn with_max_restart_attempts(mut self, attempts: u32) -> Self {
        self.max_restart_attempts = attempts;
        self
    }

    pub fn with_restart_grace(mut self, grace: Duration) -> Self {
        self.restart_grace_ms = ceil_millis(grace);
        self
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health_check_interval_ms == 0 {
            return Err(ConfigError::ZeroHealthCheckInterval);
        }
        Ok(())
    }
}

/// Whole seconds, rounded up so a sub-second duration never becomes zero.
fn ceil_secs(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_add(u64::from(duration.subsec_nanos() > 0))
}

/// Milliseconds, rounded up and saturating at `u64::MAX`.
fn ceil_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}
