//! Server configuration from environment variables and an optional JSON file.

use std::path::PathBuf;
use std::time::Duration;

use db::DbConfig;
use jobs_core::{ConfigError, SupervisorConfig, WorkerConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::LogFormat;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(#[from] ConfigError),
    #[error("No workers configured")]
    NoWorkers,
    #[error("{0} must be set together with {1}")]
    PartialCredentials(&'static str, &'static str),
}

/// Contents of the `JOBS_CONFIG` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsFile {
    pub supervisor: SupervisorConfig,
    pub workers: Vec<WorkerConfig>,
}

impl Default for JobsFile {
    fn default() -> Self {
        Self {
            supervisor: SupervisorConfig::default(),
            workers: default_workers(),
        }
    }
}

/// The queues a fresh deployment polls.
pub fn default_workers() -> Vec<WorkerConfig> {
    vec![
        WorkerConfig::new("tax-calculations")
            .with_concurrency(2)
            .with_visibility_timeout(Duration::from_secs(120)),
        WorkerConfig::new("notifications").with_concurrency(5),
        WorkerConfig::new("documents")
            .with_visibility_timeout(Duration::from_secs(300))
            .with_poll_interval(Duration::from_secs(5)),
    ]
}

/// Everything the server needs to boot.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub supervisor: SupervisorConfig,
    pub workers: Vec<WorkerConfig>,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ServerConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerConfigError> {
        let jobs = match lookup("JOBS_CONFIG") {
            Some(path) => load_jobs_file(PathBuf::from(path))?,
            None => JobsFile::default(),
        };

        let config = Self {
            db: db_config(&lookup)?,
            supervisor: jobs.supervisor,
            workers: jobs.workers,
            log_format: lookup("LOG_FORMAT")
                .map(|value| LogFormat::parse(&value))
                .unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerConfigError> {
        if self.workers.is_empty() {
            return Err(ServerConfigError::NoWorkers);
        }
        self.supervisor.validate()?;
        for worker in &self.workers {
            worker.validate()?;
        }
        Ok(())
    }
}

fn load_jobs_file(path: PathBuf) -> Result<JobsFile, ServerConfigError> {
    let raw = std::fs::read_to_string(&path).map_err(|source| ServerConfigError::Read {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ServerConfigError::Parse { path, source })
}

fn db_config(lookup: &impl Fn(&str) -> Option<String>) -> Result<DbConfig, ServerConfigError> {
    let mut config = match lookup("JOBS_DB_ENDPOINT") {
        Some(endpoint) => DbConfig::memory().with_endpoint(endpoint),
        // Railway deployment - use file-based storage
        None if lookup("RAILWAY_ENVIRONMENT").is_some() => DbConfig::file("./data/surrealdb"),
        // Local development - use in-memory
        None => DbConfig::memory(),
    };

    if let Some(namespace) = lookup("JOBS_DB_NAMESPACE") {
        config = config.with_namespace(namespace);
    }
    if let Some(database) = lookup("JOBS_DB_DATABASE") {
        config = config.with_database(database);
    }

    match (lookup("JOBS_DB_USER"), lookup("JOBS_DB_PASS")) {
        (Some(user), Some(pass)) => config = config.with_credentials(user, pass),
        (Some(_), None) => {
            return Err(ServerConfigError::PartialCredentials("JOBS_DB_USER", "JOBS_DB_PASS"));
        }
        (None, Some(_)) => {
            return Err(ServerConfigError::PartialCredentials("JOBS_DB_PASS", "JOBS_DB_USER"));
        }
        (None, None) => {}
    }

    Ok(config)
}
