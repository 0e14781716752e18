use std::time::Duration;

use deadpool_lapin::Runtime;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::ExchangeKind;

pub type Pool = deadpool_lapin::Pool;

/// Durable direct exchange all job messages go through.
pub const JOBS_EXCHANGE: &str = "transcription_jobs_exchange";
/// Durable queue the worker pool consumes.
pub const JOBS_QUEUE: &str = "transcription_jobs";
/// Routing key binding the two.
pub const JOBS_ROUTING_KEY: &str = "transcription.job";

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum RabbitError {
    Config(String),
    Connect(String),
    Topology(String),
}

impl std::fmt::Display for RabbitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "rabbitmq pool configuration failed: {msg}"),
            Self::Connect(msg) => write!(f, "rabbitmq connection failed: {msg}"),
            Self::Topology(msg) => write!(f, "rabbitmq topology declaration failed: {msg}"),
        }
    }
}

impl std::error::Error for RabbitError {}

/// Builds a connection pool and verifies the broker is reachable, retrying
/// so the process survives the broker coming up after it does.
pub async fn build_pool(url: &str, max_size: usize) -> Result<Pool, RabbitError> {
    let config = deadpool_lapin::Config {
        url: Some(url.to_string()),
        ..Default::default()
    };
    let pool = config
        .builder(Some(Runtime::Tokio1))
        .max_size(max_size)
        .build()
        .map_err(|err| RabbitError::Config(err.to_string()))?;

    let mut last_err = String::new();
    for attempt in 1..=CONNECT_ATTEMPTS {
        match pool.get().await {
            Ok(_) => {
                tracing::info!("📡 Connected to RabbitMQ (attempt {attempt})");
                return Ok(pool);
            }
            Err(err) => {
                last_err = err.to_string();
                tracing::warn!(
                    "⚠️ RabbitMQ connection attempt {attempt}/{CONNECT_ATTEMPTS} failed: {last_err}"
                );
                tokio::time::sleep(CONNECT_BACKOFF).await;
            }
        }
    }
    Err(RabbitError::Connect(last_err))
}

/// Declares the durable exchange, queue, and binding. Idempotent; both the
/// dispatcher and the consumer call it so either side can start first.
pub async fn declare_topology(channel: &lapin::Channel) -> Result<(), RabbitError> {
    channel
        .exchange_declare(
            JOBS_EXCHANGE,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|err| RabbitError::Topology(format!("exchange: {err}")))?;

    channel
        .queue_declare(
            JOBS_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|err| RabbitError::Topology(format!("queue: {err}")))?;

    channel
        .queue_bind(
            JOBS_QUEUE,
            JOBS_EXCHANGE,
            JOBS_ROUTING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|err| RabbitError::Topology(format!("binding: {err}")))?;

    Ok(())
}
