use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use tokio::sync::mpsc;

use crate::model::JobPayload;

use super::rabbit::{declare_topology, Pool, RabbitError, JOBS_QUEUE};

#[derive(Debug)]
pub enum ConsumerError {
    Connection(String),
    Channel(String),
    Topology(String),
    Consume(String),
}

impl std::fmt::Display for ConsumerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "broker connection failed: {msg}"),
            Self::Channel(msg) => write!(f, "channel creation failed: {msg}"),
            Self::Topology(msg) => write!(f, "topology declaration failed: {msg}"),
            Self::Consume(msg) => write!(f, "consumer registration failed: {msg}"),
        }
    }
}

impl std::error::Error for ConsumerError {}

/// One consumed delivery: the decoded payload plus the broker handle needed
/// to settle it. Exactly one of [`ack`](Self::ack), [`reject`](Self::reject)
/// or [`requeue`](Self::requeue) must be called per job.
pub struct Job {
    pub payload: JobPayload,
    delivery: Delivery,
}

impl Job {
    /// Settles the delivery as done. The broker forgets it.
    pub async fn ack(self) {
        if let Err(err) = self.delivery.ack(BasicAckOptions::default()).await {
            tracing::warn!("⚠️ Ack failed for job {}: {err}", self.payload.job_id);
        }
    }

    /// Drops the delivery without redelivery. Used once the failure is
    /// recorded; redelivering would only fail again.
    pub async fn reject(self) {
        let opts = BasicNackOptions {
            requeue: false,
            ..Default::default()
        };
        if let Err(err) = self.delivery.nack(opts).await {
            tracing::warn!("⚠️ Reject failed for job {}: {err}", self.payload.job_id);
        }
    }

    /// Returns the delivery to the queue for another attempt. Only for
    /// failures where nothing about the job itself was recorded.
    pub async fn requeue(self) {
        let opts = BasicNackOptions {
            requeue: true,
            ..Default::default()
        };
        if let Err(err) = self.delivery.nack(opts).await {
            tracing::warn!("⚠️ Requeue failed for job {}: {err}", self.payload.job_id);
        }
    }
}

/// Consumes the jobs queue and hands decoded jobs to the worker pool over a
/// bounded channel. Prefetch matches the worker count so the broker never
/// buries a single process under more unacked deliveries than it can run.
pub struct JobConsumer {
    channel: lapin::Channel,
    prefetch: u16,
}

impl JobConsumer {
    pub async fn new(pool: &Pool, prefetch: u16) -> Result<Self, ConsumerError> {
        let conn = pool
            .get()
            .await
            .map_err(|err| ConsumerError::Connection(err.to_string()))?;
        let channel = conn
            .create_channel()
            .await
            .map_err(|err| ConsumerError::Channel(err.to_string()))?;
        declare_topology(&channel).await.map_err(|err| match err {
            RabbitError::Topology(msg) => ConsumerError::Topology(msg),
            other => ConsumerError::Topology(other.to_string()),
        })?;

        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|err| ConsumerError::Channel(format!("qos: {err}")))?;

        Ok(Self { channel, prefetch })
    }

    /// Starts consuming and returns the receiving end. The consume loop runs
    /// until the broker closes the stream or every receiver is dropped.
    pub async fn into_receiver(self) -> Result<mpsc::Receiver<Job>, ConsumerError> {
        let consumer = self
            .channel
            .basic_consume(
                JOBS_QUEUE,
                "transcriptflow-worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|err| ConsumerError::Consume(err.to_string()))?;

        let (tx, rx) = mpsc::channel(usize::from(self.prefetch.max(1)));
        tokio::spawn(consume_loop(consumer, tx));
        tracing::info!("📥 Consuming '{JOBS_QUEUE}' (prefetch {})", self.prefetch);
        Ok(rx)
    }
}

async fn consume_loop(mut consumer: lapin::Consumer, tx: mpsc::Sender<Job>) {
    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(err) => {
                tracing::error!("❌ Delivery error: {err}");
                continue;
            }
        };

        let payload: JobPayload = match serde_json::from_slice(&delivery.data) {
            Ok(payload) => payload,
            Err(err) => {
                // Malformed messages can never succeed; drop without requeue.
                tracing::error!("❌ Undecodable job payload, dropping: {err}");
                let opts = BasicNackOptions {
                    requeue: false,
                    ..Default::default()
                };
                if let Err(err) = delivery.nack(opts).await {
                    tracing::warn!("⚠️ Nack of undecodable payload failed: {err}");
                }
                continue;
            }
        };

        if tx.send(Job { payload, delivery }).await.is_err() {
            // Pool is gone; stop consuming. Unacked deliveries go back to
            // the queue when the channel closes.
            tracing::info!("📥 Job receiver dropped, consumer stopping");
            return;
        }
    }
    tracing::warn!("⚠️ Broker closed the consume stream");
}
