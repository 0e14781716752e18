use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::BasicProperties;
use uuid::Uuid;

use crate::model::{JobPayload, TranscribeOptions};
use crate::records::{RecordError, RecordStore};

use super::rabbit::{declare_topology, Pool, RabbitError, JOBS_EXCHANGE, JOBS_ROUTING_KEY};

#[derive(Debug)]
pub enum DispatchError {
    Connection(String),
    Channel(String),
    Topology(String),
    Serialize(String),
    Publish(String),
    Record(RecordError),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "broker connection failed: {msg}"),
            Self::Channel(msg) => write!(f, "channel creation failed: {msg}"),
            Self::Topology(msg) => write!(f, "topology declaration failed: {msg}"),
            Self::Serialize(msg) => write!(f, "payload serialization failed: {msg}"),
            Self::Publish(msg) => write!(f, "publish failed: {msg}"),
            Self::Record(err) => write!(f, "job row write failed: {err}"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<RecordError> for DispatchError {
    fn from(err: RecordError) -> Self {
        Self::Record(err)
    }
}

/// Submits transcription jobs: assigns the job id, writes the `queued` status
/// row, and publishes the persistent message. The row is written before the
/// publish so a worker can never consume a job without a row to update.
#[derive(Clone)]
pub struct JobDispatcher {
    channel: lapin::Channel,
    records: RecordStore,
}

impl JobDispatcher {
    pub async fn new(pool: &Pool, records: RecordStore) -> Result<Self, DispatchError> {
        let conn = pool
            .get()
            .await
            .map_err(|err| DispatchError::Connection(err.to_string()))?;
        let channel = conn
            .create_channel()
            .await
            .map_err(|err| DispatchError::Channel(err.to_string()))?;
        declare_topology(&channel).await.map_err(|err| match err {
            RabbitError::Topology(msg) => DispatchError::Topology(msg),
            other => DispatchError::Topology(other.to_string()),
        })?;

        // Publisher confirms: submit returns only once the broker has
        // accepted the message, not just once it left the socket.
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|err| DispatchError::Channel(format!("confirm mode: {err}")))?;

        Ok(Self { channel, records })
    }

    /// Enqueues a job for audio already sitting in the object store and
    /// returns its id. The id is assigned here, before anything is durable,
    /// so every later step can be keyed by it.
    pub async fn submit(
        &self,
        user_id: i64,
        audio_storage_key: &str,
        filename: &str,
        options: &TranscribeOptions,
    ) -> Result<Uuid, DispatchError> {
        let payload = JobPayload {
            job_id: Uuid::new_v4(),
            user_id,
            audio_storage_key: audio_storage_key.to_string(),
            filename: filename.to_string(),
            model: options.model.clone(),
            translate: options.translate,
        };

        self.records.insert_queued(&payload).await?;

        let body =
            serde_json::to_vec(&payload).map_err(|err| DispatchError::Serialize(err.to_string()))?;

        let confirm = self
            .channel
            .basic_publish(
                JOBS_EXCHANGE,
                JOBS_ROUTING_KEY,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    // Persistent delivery; the job must survive a broker restart.
                    .with_delivery_mode(2),
            )
            .await
            .map_err(|err| DispatchError::Publish(err.to_string()))?;
        let confirmation = confirm
            .await
            .map_err(|err| DispatchError::Publish(err.to_string()))?;
        if let lapin::publisher_confirm::Confirmation::Nack(_) = confirmation {
            return Err(DispatchError::Publish(
                "broker refused the message".to_string(),
            ));
        }

        tracing::info!(
            "▶️ Submitted job {} for user {user_id} ({filename}, model {})",
            payload.job_id,
            payload.model
        );
        Ok(payload.job_id)
    }
}
