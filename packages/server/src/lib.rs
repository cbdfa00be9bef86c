//! Process wiring for the job worker service: configuration, logging,
//! demo processors and startup.

pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod processors;
pub mod shutdown;

pub use bootstrap::{BootstrapError, bootstrap};
pub use config::{JobsFile, ServerConfig, ServerConfigError};
pub use logging::{LogFormat, init_logging};
pub use shutdown::wait_for_signal;
