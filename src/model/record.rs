use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Durable result of one successful transcription job.
///
/// Written exactly once per successful job id (`UNIQUE` constraint in the
/// record store) and never mutated afterwards. A record existing is the
/// definition of "done": readers poll for it, and a job with no record is not
/// complete regardless of what happened to its artifacts.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TranscriptionRecord {
    /// Job this record belongs to. One record per successful job id, ever.
    pub job_id: Uuid,

    /// Owning user.
    pub user_id: i64,

    /// Original audio filename (e.g. `meeting.wav`).
    pub filename: String,

    /// Audio duration in seconds, derived from the decoded sample count.
    pub duration_secs: f64,

    /// Whisper model size that produced the transcript.
    pub model: String,

    /// Detected (or caller-forced) ISO 639-1 language of the audio.
    pub language: String,

    /// Wall-clock seconds spent in model inference. Distinct from
    /// `duration_secs`, which measures the audio itself.
    pub elapsed_secs: f64,

    /// Object-store key of the transcript text in the `transcriptions` bucket.
    pub transcript_key: String,

    /// When the worker finished the job.
    pub completed_at: DateTime<Utc>,
}
