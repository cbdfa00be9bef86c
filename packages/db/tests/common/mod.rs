use db::{DbConfig, DbError, SurrealQueue};

/// Fresh queue on its own in-memory database, so tests never share rows.
pub async fn setup_queue() -> Result<SurrealQueue, DbError> {
    let config = DbConfig::memory()
        .with_namespace("test")
        .with_database(ulid::Ulid::new().to_string());
    SurrealQueue::connect(&config).await
}
