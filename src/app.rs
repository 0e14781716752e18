use std::sync::Arc;

use crate::audio::AudioLimits;
use crate::config::{Config, ConfigError};
use crate::extract::{ExtractError, ExtractionCache};
use crate::ingest::IngestService;
use crate::messaging::{self, ConsumerError, DispatchError, JobConsumer, JobDispatcher, RabbitError};
use crate::metrics::Metrics;
use crate::records::{RecordError, RecordStore};
use crate::shutdown;
use crate::storage::{ObjectStore, StorageError};
use crate::whisper::{EngineError, WhisperEngine};
use crate::worker::{WorkerContext, WorkerPool};

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Io(std::io::Error),
    Rabbit(RabbitError),
    Records(RecordError),
    Storage(StorageError),
    Engine(EngineError),
    Consumer(ConsumerError),
    Dispatch(DispatchError),
    Extract(ExtractError),
    Startup(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration: {err}"),
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Rabbit(err) => write!(f, "broker: {err}"),
            Self::Records(err) => write!(f, "record store: {err}"),
            Self::Storage(err) => write!(f, "object store: {err}"),
            Self::Engine(err) => write!(f, "whisper: {err}"),
            Self::Consumer(err) => write!(f, "consumer: {err}"),
            Self::Dispatch(err) => write!(f, "dispatcher: {err}"),
            Self::Extract(err) => write!(f, "extraction: {err}"),
            Self::Startup(msg) => write!(f, "startup: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
impl From<RabbitError> for AppError {
    fn from(err: RabbitError) -> Self {
        Self::Rabbit(err)
    }
}
impl From<RecordError> for AppError {
    fn from(err: RecordError) -> Self {
        Self::Records(err)
    }
}
impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}
impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}
impl From<ConsumerError> for AppError {
    fn from(err: ConsumerError) -> Self {
        Self::Consumer(err)
    }
}
impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        Self::Dispatch(err)
    }
}
impl From<ExtractError> for AppError {
    fn from(err: ExtractError) -> Self {
        Self::Extract(err)
    }
}

/// Builds the caller-facing ingest pipeline from configuration: extraction
/// cache (TTL, size and time ceilings, scratch directory), object store,
/// record store, and job dispatcher.
///
/// This is the embedding frontend's entry point. The worker daemon
/// ([`run`]) never extracts, so it does not call this.
pub async fn build_ingest(config: &Config, metrics: Arc<Metrics>) -> Result<IngestService, AppError> {
    tokio::fs::create_dir_all(&config.tmp_dir).await?;
    let cache = Arc::new(ExtractionCache::from_config(config, metrics)?);

    let store = ObjectStore::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_access_key,
        &config.s3_secret_key,
    );
    store.ensure_buckets().await?;

    let records = RecordStore::connect(&config.database_url, 4).await?;
    records.ensure_schema().await?;

    let pool = messaging::build_pool(&config.rabbitmq_url, 2).await?;
    let dispatcher = JobDispatcher::new(&pool, records).await?;

    Ok(IngestService::new(cache, store, dispatcher))
}

/// Boots the transcription daemon and runs it until SIGINT/SIGTERM.
///
/// Startup is eager: the broker, database, object store, and default whisper
/// model are all verified before the first job is consumed, so a
/// misconfigured process dies at boot instead of on its first job.
pub async fn run() -> Result<(), AppError> {
    let config = Config::load()?;
    config.log_summary();

    let metrics = Metrics::new();
    let (shutdown_handle, shutdown_signal) = shutdown::channel();

    // One connection per worker plus headroom for the consumer channel.
    let pool = messaging::build_pool(&config.rabbitmq_url, config.workers_count + 2).await?;

    let records = RecordStore::connect(&config.database_url, config.workers_count as u32 + 2)
        .await?;
    records.ensure_schema().await?;

    let store = ObjectStore::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_access_key,
        &config.s3_secret_key,
    );
    store.ensure_buckets().await?;

    let engine = WhisperEngine::new(config.models_dir.clone());
    {
        let engine = engine.clone();
        let model = config.whisper_model.clone();
        tokio::task::spawn_blocking(move || engine.preload(&model))
            .await
            .map_err(|err| AppError::Startup(format!("model preload panicked: {err}")))??;
    }

    let consumer = JobConsumer::new(&pool, config.workers_count as u16).await?;
    let jobs = consumer.into_receiver().await?;

    let ctx = WorkerContext {
        engine,
        store,
        records,
        limits: AudioLimits {
            max_duration_secs: config.max_audio_duration_sec,
        },
        metrics: Arc::clone(&metrics),
    };
    let pool_task = tokio::spawn(WorkerPool::new(ctx, config.workers_count).run(jobs, shutdown_signal));

    tracing::info!("▶️ transcriptflow daemon ready");
    shutdown::wait_for_os_signal().await?;

    shutdown_handle.trigger();
    if let Err(err) = pool_task.await {
        tracing::error!("❌ Worker pool task panicked: {err}");
    }

    metrics.log_summary();
    tracing::info!("🛑 Shutdown complete");
    Ok(())
}
