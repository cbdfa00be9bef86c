//! SurrealDB-backed queue service for the job worker system.
//!
//! Messages live in a single `queue_message` table. A message is visible when
//! its `visible_at_ms` is in the past; dequeuing pushes it into the future by
//! the visibility timeout, which is the lease.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod queue;
mod schema;

pub use connection::{Database, DbConfig, DbError, connect_db};
pub use queue::SurrealQueue;
pub use schema::init_schema;
