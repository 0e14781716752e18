use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-chosen knobs for one transcription request.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    /// Whisper model size (`tiny`, `base`, `small`, `medium`, `large-v3`).
    pub model: String,
    /// Translate the transcript to English instead of transcribing verbatim.
    pub translate: bool,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            model: "base".to_string(),
            translate: false,
        }
    }
}

/// Transcription job message exchanged over the broker.
///
/// Published to: `transcription_jobs_exchange` (direct)
/// Routing key:  `transcription.job`
/// Queue:        `transcription_jobs`
///
/// The payload is flat and self-contained: a worker needs nothing beyond it
/// (plus the shared stores) to execute the job. Delivery is at-least-once, so
/// everything a worker does with it must be idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    /// Globally unique job identifier, assigned at submission time before the
    /// message reaches the broker. Also the job handle returned to the caller.
    pub job_id: Uuid,

    /// Owning user. Namespaces every storage key derived from this job.
    pub user_id: i64,

    /// Object-store key of the audio artifact in the `audio-files` bucket.
    pub audio_storage_key: String,

    /// Original filename of the extracted audio (e.g. `meeting.wav`).
    pub filename: String,

    /// Requested whisper model size.
    pub model: String,

    /// Translate to English instead of transcribing.
    #[serde(default)]
    pub translate: bool,
}

// ── Job status ─────────────────────────────────────────────────────────────────

/// Lifecycle of one job attempt.
///
/// Transitions are monotonic: `queued → running → succeeded | failed`.
/// A job never re-enters `queued`; retrying means submitting a new job with a
/// new id. The record store enforces this with guarded updates, but the rule
/// itself lives here so it can be checked anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Stable identifier stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// `true` if the status admits no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Failed)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trips_as_flat_json() {
        let payload = JobPayload {
            job_id: Uuid::new_v4(),
            user_id: 7,
            audio_storage_key: "7/meeting.wav".into(),
            filename: "meeting.wav".into(),
            model: "base".into(),
            translate: true,
        };

        let json = serde_json::to_value(&payload).unwrap();
        // Flat structure: every field at the top level, nothing nested.
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 6);
        assert!(obj.values().all(|v| !v.is_object() && !v.is_array()));

        let back: JobPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.job_id, payload.job_id);
        assert_eq!(back.audio_storage_key, payload.audio_storage_key);
        assert!(back.translate);
    }

    #[test]
    fn translate_defaults_to_false_when_absent() {
        let json = r#"{
            "job_id": "550e8400-e29b-41d4-a716-446655440000",
            "user_id": 1,
            "audio_storage_key": "1/a.wav",
            "filename": "a.wav",
            "model": "base"
        }"#;
        let payload: JobPayload = serde_json::from_str(json).unwrap();
        assert!(!payload.translate);
    }

    #[test]
    fn status_is_monotonic() {
        use JobStatus::*;

        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Failed));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));

        // No path back to queued, and terminal states are absorbing.
        for status in [Running, Succeeded, Failed] {
            assert!(!status.can_transition_to(Queued));
        }
        for terminal in [Succeeded, Failed] {
            assert!(terminal.is_terminal());
            for next in [Queued, Running, Succeeded, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }

        // A recorded failure can never become a success.
        assert!(!Failed.can_transition_to(Succeeded));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }
}
