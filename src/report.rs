use std::str::FromStr;

use tokio::sync::mpsc;

// ── Error taxonomy ─────────────────────────────────────────────────────────────

/// Closed set of failure classes surfaced to callers.
///
/// Every error produced by the pipeline maps onto exactly one kind; the kind
/// selects the user-facing message class via [`ErrorKind::user_message`].
/// Raw detail (subprocess stderr, driver errors) goes to `tracing` only and is
/// never shown verbatim to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad format, oversized file, malformed source reference.
    InputValidation,
    /// ffmpeg failure, timeout, unreadable output, remote download failure.
    Extraction,
    /// Object not found, upload/download failure against the object store.
    Storage,
    /// Inference failure, malformed or unsupported audio.
    Model,
    /// Job/record write failure against the relational store.
    Persistence,
}

impl ErrorKind {
    /// Stable identifier stored in the `error_kind` column of job rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputValidation => "input_validation",
            Self::Extraction => "extraction",
            Self::Storage => "storage",
            Self::Model => "model",
            Self::Persistence => "persistence",
        }
    }

    /// One user-facing message class per kind. Specific enough to be
    /// actionable, generic enough to never leak internals.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InputValidation => {
                "The source was rejected. Check the file format and size and try again."
            }
            Self::Extraction => {
                "Audio extraction failed. Check that the video source is valid and try again."
            }
            Self::Storage => "Storage is unavailable right now. Try again in a moment.",
            Self::Model => "The audio could not be transcribed. It may be in an unsupported format.",
            Self::Persistence => "The result could not be recorded. Resubmit the job.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input_validation" => Ok(Self::InputValidation),
            "extraction" => Ok(Self::Extraction),
            "storage" => Ok(Self::Storage),
            "model" => Ok(Self::Model),
            "persistence" => Ok(Self::Persistence),
            other => Err(format!("unknown error kind: {other}")),
        }
    }
}

// ── Reports ────────────────────────────────────────────────────────────────────

/// One event on the progress/error channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// Advisory progress update for a multi-step operation.
    Progress {
        /// Fractional completion in `0.0..=1.0`.
        fraction: f32,
        /// Short human-readable step label ("extracting audio", ...).
        label: String,
    },
    /// Terminal failure. `message` is already user-facing.
    Failure { kind: ErrorKind, message: String },
}

// ── Reporter ───────────────────────────────────────────────────────────────────

/// Sending half of the progress/error channel handed to pipeline operations.
///
/// The receiving half is consumed by the UI collaborator; the core never
/// depends on a rendering mechanism. The reporter only formats and forwards;
/// it does not retry, dedupe, or suppress. Sends are fire-and-forget: a
/// dropped receiver silently discards events, which keeps progress strictly
/// advisory.
#[derive(Clone)]
pub struct Reporter {
    tx: Option<mpsc::UnboundedSender<Report>>,
}

impl Reporter {
    /// Build a connected reporter/receiver pair.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Report>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A reporter that discards everything. For headless callers and tests.
    pub fn noop() -> Self {
        Self { tx: None }
    }

    /// Emit an advisory progress fraction with a step label.
    pub fn progress(&self, fraction: f32, label: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Report::Progress {
                fraction: fraction.clamp(0.0, 1.0),
                label: label.to_string(),
            });
        }
    }

    /// Emit a terminal failure formatted for the caller. The raw error detail
    /// must already have been logged at the failure site.
    pub fn failure(&self, kind: ErrorKind, message: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Report::Failure {
                kind,
                message: message.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            ErrorKind::InputValidation,
            ErrorKind::Extraction,
            ErrorKind::Storage,
            ErrorKind::Model,
            ErrorKind::Persistence,
        ] {
            assert_eq!(kind.as_str().parse::<ErrorKind>().unwrap(), kind);
        }
        assert!("made_up".parse::<ErrorKind>().is_err());
    }

    #[test]
    fn every_kind_has_a_distinct_user_message() {
        let kinds = [
            ErrorKind::InputValidation,
            ErrorKind::Extraction,
            ErrorKind::Storage,
            ErrorKind::Model,
            ErrorKind::Persistence,
        ];
        for a in &kinds {
            for b in &kinds {
                if a != b {
                    assert_ne!(a.user_message(), b.user_message());
                }
            }
        }
    }

    #[tokio::test]
    async fn reporter_forwards_in_order() {
        let (reporter, mut rx) = Reporter::channel();

        reporter.progress(0.25, "extracting audio");
        reporter.progress(1.5, "done"); // clamped
        reporter.failure(ErrorKind::Storage, "storage unavailable, try again");

        assert_eq!(
            rx.recv().await.unwrap(),
            Report::Progress { fraction: 0.25, label: "extracting audio".into() }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            Report::Progress { fraction: 1.0, label: "done".into() }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            Report::Failure {
                kind: ErrorKind::Storage,
                message: "storage unavailable, try again".into()
            }
        );
    }

    #[test]
    fn noop_reporter_never_panics() {
        let reporter = Reporter::noop();
        reporter.progress(0.5, "halfway");
        reporter.failure(ErrorKind::Model, "whatever");
    }
}
