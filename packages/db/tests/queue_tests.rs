#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::time::Duration;

use jobs_core::{JobEnvelope, MessageId, QueueError, QueueService};
use serde_json::json;

const LEASE: Duration = Duration::from_secs(30);

fn envelope(job_type: &str) -> JobEnvelope {
    JobEnvelope::new(job_type, json!({ "client_id": "c-42", "year": 2024 }))
}

#[tokio::test]
async fn enqueue_then_dequeue_returns_first_delivery() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;

    let id = queue.enqueue("tax", envelope("calculate-tax")).await?;
    assert_eq!(queue.count("tax").await?, 1);

    let delivery = queue.dequeue("tax", LEASE).await?.ok_or("expected a delivery")?;
    assert_eq!(delivery.message_id, id);
    assert_eq!(delivery.delivery_count, 1);
    assert_eq!(delivery.job_type(), "calculate-tax");
    assert_eq!(delivery.payload()["client_id"], "c-42");

    Ok(())
}

#[tokio::test]
async fn leased_message_is_hidden_until_timeout() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    queue.enqueue("tax", envelope("calculate-tax")).await?;

    let first = queue
        .dequeue("tax", Duration::from_millis(200))
        .await?
        .ok_or("expected a delivery")?;
    assert!(queue.dequeue("tax", LEASE).await?.is_none());

    tokio::time::sleep(Duration::from_millis(350)).await;

    let second = queue.dequeue("tax", LEASE).await?.ok_or("expected redelivery")?;
    assert_eq!(second.message_id, first.message_id);
    assert_eq!(second.delivery_count, 2);

    Ok(())
}

#[tokio::test]
async fn ack_removes_message() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    queue.enqueue("notify", envelope("send-email")).await?;

    let delivery = queue.dequeue("notify", LEASE).await?.ok_or("expected a delivery")?;
    queue.ack("notify", delivery.message_id).await?;

    assert_eq!(queue.count("notify").await?, 0);
    assert!(queue.dequeue("notify", LEASE).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn nack_delays_redelivery() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    queue.enqueue("docs", envelope("render-pdf")).await?;

    let delivery = queue.dequeue("docs", LEASE).await?.ok_or("expected a delivery")?;
    queue
        .nack("docs", delivery.message_id, Duration::from_secs(60))
        .await?;
    assert!(queue.dequeue("docs", LEASE).await?.is_none());
    assert_eq!(queue.count("docs").await?, 1);

    // A zero delay makes the message visible again straight away.
    queue.nack("docs", delivery.message_id, Duration::ZERO).await?;
    let again = queue.dequeue("docs", LEASE).await?.ok_or("expected redelivery")?;
    assert_eq!(again.message_id, delivery.message_id);
    assert_eq!(again.delivery_count, 2);

    Ok(())
}

#[tokio::test]
async fn settling_unknown_message_fails() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    let missing = MessageId::new();

    let ack = queue.ack("tax", missing).await;
    assert!(matches!(ack, Err(QueueError::MessageNotFound(id)) if id == missing));

    let nack = queue.nack("tax", missing, Duration::ZERO).await;
    assert!(matches!(nack, Err(QueueError::MessageNotFound(_))));

    Ok(())
}

#[tokio::test]
async fn queues_are_isolated() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    let id = queue.enqueue("tax", envelope("calculate-tax")).await?;

    assert!(queue.dequeue("notify", LEASE).await?.is_none());
    assert!(matches!(
        queue.ack("notify", id).await,
        Err(QueueError::MessageNotFound(_))
    ));
    assert_eq!(queue.count("tax").await?, 1);

    Ok(())
}

#[tokio::test]
async fn ensure_queue_checks_connection() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    queue.ensure_queue("tax").await?;
    Ok(())
}
