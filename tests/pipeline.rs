//! End-to-end checks of the pipeline pieces that run without external
//! services: source validation, progress reporting, payload wire format,
//! and the job status rules the stores enforce.

use std::path::PathBuf;
use std::time::Duration;

use transcriptflow::extract::{ExtractError, ExtractLimits, MediaExtractor, SourceReference};
use transcriptflow::model::{JobPayload, JobStatus, TranscribeOptions};
use transcriptflow::report::{ErrorKind, Report, Reporter};
use transcriptflow::storage::object_key;

fn extractor(max_source_bytes: u64) -> (MediaExtractor, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let limits = ExtractLimits {
        max_source_bytes,
        timeout: Duration::from_secs(5),
    };
    let ex = MediaExtractor::new(limits, dir.path().to_path_buf()).unwrap();
    (ex, dir)
}

#[tokio::test]
async fn rejected_source_reports_before_any_work() {
    let (ex, dir) = extractor(1024);
    let (reporter, mut rx) = Reporter::channel();

    let missing = SourceReference::LocalFile(dir.path().join("nope.mp4"));
    let err = ex.extract(&missing, &reporter).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputValidation);

    // The extractor itself only emits progress; the failure report is the
    // ingest layer's job. Validation fails after the first progress tick.
    let first = rx.recv().await.unwrap();
    assert!(matches!(first, Report::Progress { .. }));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn size_ceiling_applies_to_local_files() {
    let (ex, dir) = extractor(10);
    let path = dir.path().join("big.mkv");
    std::fs::write(&path, vec![0u8; 100]).unwrap();

    let err = ex
        .extract(&SourceReference::LocalFile(path), &Reporter::noop())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::TooLarge { .. }));
}

#[test]
fn payload_wire_format_is_stable() {
    let options = TranscribeOptions::default();
    assert_eq!(options.model, "base");
    assert!(!options.translate);

    // A payload published by an older build (no translate field) still decodes.
    let legacy = r#"{
        "job_id": "550e8400-e29b-41d4-a716-446655440000",
        "user_id": 42,
        "audio_storage_key": "42/standup.wav",
        "filename": "standup.wav",
        "model": "small"
    }"#;
    let payload: JobPayload = serde_json::from_str(legacy).unwrap();
    assert_eq!(payload.user_id, 42);
    assert_eq!(payload.model, "small");
    assert!(!payload.translate);

    // And what we publish today decodes to the same thing.
    let reencoded = serde_json::to_string(&payload).unwrap();
    let back: JobPayload = serde_json::from_str(&reencoded).unwrap();
    assert_eq!(back.audio_storage_key, "42/standup.wav");
}

#[test]
fn job_lifecycle_has_no_way_back() {
    // The path every successful job takes.
    assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
    assert!(JobStatus::Running.can_transition_to(JobStatus::Succeeded));

    // Resubmission means a new job id, never a status reset.
    assert!(!JobStatus::Failed.can_transition_to(JobStatus::Queued));
    assert!(!JobStatus::Succeeded.can_transition_to(JobStatus::Running));
}

#[test]
fn storage_keys_separate_users_and_artifacts() {
    let audio = object_key(7, "standup.wav");
    let transcript = object_key(7, "standup.txt");
    assert_eq!(audio, "7/standup.wav");
    assert_eq!(transcript, "7/standup.txt");
    assert_ne!(audio, object_key(8, "standup.wav"));
}

#[test]
fn source_identity_feeds_the_cache_exactly() {
    let a = SourceReference::RemoteUrl("https://example.com/a.mp4".into());
    let b = SourceReference::RemoteUrl("https://example.com/a.mp4?".into());
    // Trailing punctuation is a different source on purpose.
    assert_ne!(a.identity(), b.identity());

    let file = SourceReference::LocalFile(PathBuf::from("/data/a.mp4"));
    assert_eq!(file.identity(), "/data/a.mp4");
}
