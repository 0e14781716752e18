use std::sync::Arc;

use uuid::Uuid;

use crate::extract::{ExtractError, ExtractionCache, SourceReference};
use crate::messaging::{DispatchError, JobDispatcher};
use crate::model::TranscribeOptions;
use crate::report::{ErrorKind, Reporter};
use crate::storage::{object_key, ObjectStore, StorageError, AUDIO_BUCKET};

#[derive(Debug)]
pub enum IngestError {
    Extract(ExtractError),
    Storage(StorageError),
    Dispatch(DispatchError),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Extract(err) => err.kind(),
            Self::Storage(_) => ErrorKind::Storage,
            Self::Dispatch(_) => ErrorKind::Persistence,
        }
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extract(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Dispatch(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for IngestError {}

/// Front door of the pipeline: turns a video source into a queued
/// transcription job.
///
/// The returned job id is the caller's only handle; completion shows up as a
/// row in the record store, not as a return value. Callers that want progress
/// during the synchronous part (extraction and upload) pass a channel-backed
/// [`Reporter`].
#[derive(Clone)]
pub struct IngestService {
    cache: Arc<ExtractionCache>,
    store: ObjectStore,
    dispatcher: JobDispatcher,
}

impl IngestService {
    pub fn new(cache: Arc<ExtractionCache>, store: ObjectStore, dispatcher: JobDispatcher) -> Self {
        Self {
            cache,
            store,
            dispatcher,
        }
    }

    /// Extracts (or reuses) the audio of `source`, uploads it under the
    /// user's namespace, and enqueues the transcription job.
    pub async fn transcribe_source(
        &self,
        user_id: i64,
        source: &SourceReference,
        options: &TranscribeOptions,
        reporter: &Reporter,
    ) -> Result<Uuid, IngestError> {
        let artifact = match self.cache.get_or_extract(source, reporter).await {
            Ok(artifact) => artifact,
            Err(err) => {
                tracing::error!("❌ Extraction failed for {source}: {err}");
                reporter.failure(err.kind(), err.kind().user_message());
                return Err(IngestError::Extract(err));
            }
        };

        let audio_key = object_key(user_id, &artifact.filename);
        if let Err(err) = self
            .store
            .put(AUDIO_BUCKET, &audio_key, artifact.wav.clone())
            .await
        {
            tracing::error!("❌ Audio upload failed for {audio_key}: {err}");
            reporter.failure(ErrorKind::Storage, ErrorKind::Storage.user_message());
            return Err(IngestError::Storage(err));
        }

        match self
            .dispatcher
            .submit(user_id, &audio_key, &artifact.filename, options)
            .await
        {
            Ok(job_id) => Ok(job_id),
            Err(err) => {
                tracing::error!("❌ Job submission failed for {audio_key}: {err}");
                reporter.failure(ErrorKind::Persistence, ErrorKind::Persistence.user_message());
                Err(IngestError::Dispatch(err))
            }
        }
    }
}
