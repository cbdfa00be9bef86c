//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// Safe to run on every connect; every definition is `IF NOT EXISTS`.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing queue schema...");

    db.query(MESSAGE_SCHEMA).await?.check()?;

    tracing::info!("Queue schema initialized");

    Ok(())
}

/// Message table schema.
///
/// Payloads are arbitrary JSON, so the table stays schemaless; the indexes
/// cover the dequeue scan (queue name, then visibility time).
const MESSAGE_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS queue_message SCHEMALESS;

DEFINE INDEX IF NOT EXISTS message_id ON queue_message FIELDS message_id UNIQUE;
DEFINE INDEX IF NOT EXISTS message_visible ON queue_message FIELDS queue, visible_at_ms;
"#;
