use server::{ServerConfig, bootstrap, init_logging, wait_for_signal};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    init_logging(config.log_format);

    let supervisor = bootstrap(&config).await?;
    let mut events = supervisor.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    tracing::debug!(queue = event.queue_name(), "{}", event.description())
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event log skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    wait_for_signal().await;

    tracing::info!("Shutting down workers...");
    supervisor.shutdown().await?;
    event_log.abort();
    tracing::info!("Shutdown complete");

    Ok(())
}
