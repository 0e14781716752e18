use chrono::Utc;

use crate::audio::{self, AudioError};
use crate::messaging::Job;
use crate::model::TranscriptionRecord;
use crate::report::ErrorKind;
use crate::storage::{object_key, AUDIO_BUCKET, TRANSCRIPT_BUCKET};
use crate::whisper::EngineError;

use super::pool::WorkerContext;

/// A job-fatal error with its classification.
struct TaskError {
    kind: ErrorKind,
    message: String,
}

impl From<AudioError> for TaskError {
    fn from(err: AudioError) -> Self {
        let kind = match err {
            AudioError::TooLong { .. } => ErrorKind::InputValidation,
            _ => ErrorKind::Model,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<EngineError> for TaskError {
    fn from(err: EngineError) -> Self {
        Self {
            kind: ErrorKind::Model,
            message: err.to_string(),
        }
    }
}

/// Executes one consumed job end to end and settles its delivery.
///
/// Delivery is at-least-once, so the whole path is idempotent: a job whose
/// record already exists acks immediately, artifact uploads overwrite the
/// same key, and the record insert ignores conflicts on the job id.
pub(crate) async fn process(worker_id: usize, job: Job, ctx: &WorkerContext) {
    ctx.metrics.inc_received();
    ctx.metrics.inc_in_flight();
    handle(worker_id, job, ctx).await;
    ctx.metrics.dec_in_flight();
}

async fn handle(worker_id: usize, job: Job, ctx: &WorkerContext) {
    let job_id = job.payload.job_id;
    tracing::info!(
        "👷 Worker {worker_id} picked up job {job_id} ({})",
        job.payload.filename
    );

    // Redelivery of a finished job: nothing to do.
    match ctx.records.find_record(job_id).await {
        Ok(Some(_)) => {
            tracing::info!("♻️ Job {job_id} already has a record, acking duplicate");
            job.ack().await;
            return;
        }
        Ok(None) => {}
        Err(err) => {
            // Can't tell whether the job ran; put it back unjudged.
            tracing::warn!("⚠️ Duplicate check failed for job {job_id}: {err}");
            job.requeue().await;
            return;
        }
    }

    match ctx.records.mark_running(job_id).await {
        Ok(true) => {}
        // Missing or non-queued row. The work itself is still valid, and
        // the guarded updates keep a terminal row from regressing.
        Ok(false) => tracing::warn!("⚠️ Job {job_id} has no queued row, running anyway"),
        Err(err) => {
            tracing::warn!("⚠️ Status update failed for job {job_id}: {err}");
            job.requeue().await;
            return;
        }
    }

    let wav = match ctx
        .store
        .get(AUDIO_BUCKET, &job.payload.audio_storage_key)
        .await
    {
        Ok(bytes) => bytes,
        Err(err) => {
            fail_job(job, ctx, ErrorKind::Storage, &err.to_string()).await;
            return;
        }
    };

    // Decode and inference are CPU-bound for minutes; off the runtime.
    let engine = ctx.engine.clone();
    let limits = ctx.limits;
    let model = job.payload.model.clone();
    let translate = job.payload.translate;
    let outcome = tokio::task::spawn_blocking(move || {
        let prepared = audio::prepare(&wav, limits).map_err(TaskError::from)?;
        let output = engine
            .transcribe(&model, &prepared.samples, None, translate)
            .map_err(TaskError::from)?;
        Ok::<_, TaskError>((prepared.duration_secs, output))
    })
    .await;

    let (duration_secs, output) = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            fail_job(job, ctx, err.kind, &err.message).await;
            return;
        }
        Err(err) => {
            let message = format!("inference task panicked: {err}");
            fail_job(job, ctx, ErrorKind::Model, &message).await;
            return;
        }
    };

    let stem = job
        .payload
        .filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(&job.payload.filename);
    let transcript_key = object_key(job.payload.user_id, &format!("{stem}.txt"));

    if let Err(err) = ctx
        .store
        .put(
            TRANSCRIPT_BUCKET,
            &transcript_key,
            output.text.clone().into_bytes(),
        )
        .await
    {
        fail_job(job, ctx, ErrorKind::Storage, &err.to_string()).await;
        return;
    }

    let record = TranscriptionRecord {
        job_id,
        user_id: job.payload.user_id,
        filename: job.payload.filename.clone(),
        duration_secs,
        model: job.payload.model.clone(),
        language: output.language,
        elapsed_secs: output.elapsed.as_secs_f64(),
        transcript_key,
        completed_at: Utc::now(),
    };

    match ctx.records.insert_record(&record).await {
        Ok(true) => {}
        Ok(false) => tracing::info!("♻️ Record for job {job_id} already existed"),
        Err(err) => {
            // The transcript object is orphaned but harmless; a resubmitted
            // job overwrites it.
            fail_job(job, ctx, ErrorKind::Persistence, &err.to_string()).await;
            return;
        }
    }

    match ctx.records.mark_succeeded(job_id).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!("⚠️ Job {job_id} was not running at completion"),
        Err(err) => tracing::warn!("⚠️ Success status update failed for job {job_id}: {err}"),
    }

    ctx.metrics.inc_succeeded();
    tracing::info!(
        "✅ Worker {worker_id} finished job {job_id}: {:.1}s of audio, language '{}', {:.1}s inference",
        duration_secs,
        record.language,
        record.elapsed_secs
    );
    job.ack().await;
}

/// Records a terminal failure and settles the delivery. The delivery is only
/// requeued when the failure itself could not be recorded; a recorded failure
/// is final and redelivering would just repeat it.
async fn fail_job(job: Job, ctx: &WorkerContext, kind: ErrorKind, message: &str) {
    let job_id = job.payload.job_id;
    ctx.metrics.inc_failed();
    tracing::error!("❌ Job {job_id} failed ({}): {message}", kind.as_str());

    match ctx.records.mark_failed(job_id, kind, message).await {
        Ok(true) => job.reject().await,
        Ok(false) => {
            tracing::warn!("⚠️ Job {job_id} was already terminal when failing");
            job.reject().await;
        }
        Err(err) => {
            tracing::warn!("⚠️ Could not record failure for job {job_id}: {err}");
            job.requeue().await;
        }
    }
}
