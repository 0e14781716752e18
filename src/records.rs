use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::model::{JobPayload, JobStatus, TranscriptionRecord};
use crate::report::ErrorKind;

#[derive(Debug)]
pub enum RecordError {
    Connect(String),
    Query(String),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(msg) => write!(f, "database connection failed: {msg}"),
            Self::Query(msg) => write!(f, "database query failed: {msg}"),
        }
    }
}

impl std::error::Error for RecordError {}

impl From<sqlx::Error> for RecordError {
    fn from(err: sqlx::Error) -> Self {
        Self::Query(err.to_string())
    }
}

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_BACKOFF: Duration = Duration::from_secs(3);

/// Postgres-backed store of job status rows and finished transcription
/// records. Status rows are mutable but monotonic; records are append-only
/// with one row per successful job id.
#[derive(Clone)]
pub struct RecordStore {
    pool: PgPool,
}

impl RecordStore {
    /// Connects with retries so the process survives the database coming up
    /// after it does.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, RecordError> {
        let mut last_err = String::new();
        for attempt in 1..=CONNECT_ATTEMPTS {
            match PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(database_url)
                .await
            {
                Ok(pool) => {
                    tracing::info!("🗄️ Connected to Postgres (attempt {attempt})");
                    return Ok(Self { pool });
                }
                Err(err) => {
                    last_err = err.to_string();
                    tracing::warn!(
                        "⚠️ Postgres connection attempt {attempt}/{CONNECT_ATTEMPTS} failed: {last_err}"
                    );
                    tokio::time::sleep(CONNECT_BACKOFF).await;
                }
            }
        }
        Err(RecordError::Connect(last_err))
    }

    /// Creates the schema if missing. Idempotent; runs on every startup.
    pub async fn ensure_schema(&self) -> Result<(), RecordError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transcription_jobs (
                job_id        UUID PRIMARY KEY,
                user_id       BIGINT NOT NULL,
                filename      TEXT NOT NULL,
                model         TEXT NOT NULL,
                translate     BOOLEAN NOT NULL DEFAULT FALSE,
                status        TEXT NOT NULL,
                error_kind    TEXT,
                error_message TEXT,
                submitted_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transcription_records (
                id             BIGSERIAL PRIMARY KEY,
                job_id         UUID NOT NULL UNIQUE,
                user_id        BIGINT NOT NULL,
                filename       TEXT NOT NULL,
                duration_secs  DOUBLE PRECISION NOT NULL,
                model          TEXT NOT NULL,
                language       TEXT NOT NULL,
                elapsed_secs   DOUBLE PRECISION NOT NULL,
                transcript_key TEXT NOT NULL,
                completed_at   TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Job status ─────────────────────────────────────────────────────────────

    /// Writes the `queued` row for a freshly submitted job. Runs before the
    /// message is published so a consumed job always has a row to update.
    pub async fn insert_queued(&self, payload: &JobPayload) -> Result<(), RecordError> {
        sqlx::query(
            r#"
            INSERT INTO transcription_jobs (job_id, user_id, filename, model, translate, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(payload.job_id)
        .bind(payload.user_id)
        .bind(&payload.filename)
        .bind(&payload.model)
        .bind(payload.translate)
        .bind(JobStatus::Queued.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `queued → running`. Returns `false` when the guard did not match,
    /// which means another delivery of the same job got there first.
    pub async fn mark_running(&self, job_id: Uuid) -> Result<bool, RecordError> {
        let result = sqlx::query(
            r#"
            UPDATE transcription_jobs
            SET status = $1, updated_at = now()
            WHERE job_id = $2 AND status = $3
            "#,
        )
        .bind(JobStatus::Running.as_str())
        .bind(job_id)
        .bind(JobStatus::Queued.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// `running → succeeded`. Guarded the same way as [`mark_running`].
    pub async fn mark_succeeded(&self, job_id: Uuid) -> Result<bool, RecordError> {
        let result = sqlx::query(
            r#"
            UPDATE transcription_jobs
            SET status = $1, updated_at = now()
            WHERE job_id = $2 AND status = $3
            "#,
        )
        .bind(JobStatus::Succeeded.as_str())
        .bind(job_id)
        .bind(JobStatus::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Terminal failure with its classification. Applies from `queued` or
    /// `running`; a job already terminal stays untouched.
    pub async fn mark_failed(
        &self,
        job_id: Uuid,
        kind: ErrorKind,
        message: &str,
    ) -> Result<bool, RecordError> {
        let result = sqlx::query(
            r#"
            UPDATE transcription_jobs
            SET status = $1, error_kind = $2, error_message = $3, updated_at = now()
            WHERE job_id = $4 AND status IN ($5, $6)
            "#,
        )
        .bind(JobStatus::Failed.as_str())
        .bind(kind.as_str())
        .bind(message)
        .bind(job_id)
        .bind(JobStatus::Queued.as_str())
        .bind(JobStatus::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Current status of a job, if the job exists.
    pub async fn job_status(&self, job_id: Uuid) -> Result<Option<JobStatus>, RecordError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM transcription_jobs WHERE job_id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            None => Ok(None),
            Some((status,)) => status
                .parse()
                .map(Some)
                .map_err(|msg: String| RecordError::Query(msg)),
        }
    }

    // ── Transcription records ──────────────────────────────────────────────────

    /// Inserts the finished record. Returns `false` when a record for this
    /// job id already exists, which a redelivered job treats as already done.
    pub async fn insert_record(&self, record: &TranscriptionRecord) -> Result<bool, RecordError> {
        let result = sqlx::query(
            r#"
            INSERT INTO transcription_records
                (job_id, user_id, filename, duration_secs, model, language,
                 elapsed_secs, transcript_key, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(record.job_id)
        .bind(record.user_id)
        .bind(&record.filename)
        .bind(record.duration_secs)
        .bind(&record.model)
        .bind(&record.language)
        .bind(record.elapsed_secs)
        .bind(&record.transcript_key)
        .bind(record.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// The record for `job_id`, if the job already succeeded.
    pub async fn find_record(
        &self,
        job_id: Uuid,
    ) -> Result<Option<TranscriptionRecord>, RecordError> {
        let record = sqlx::query_as::<_, TranscriptionRecord>(
            r#"
            SELECT job_id, user_id, filename, duration_secs, model, language,
                   elapsed_secs, transcript_key, completed_at
            FROM transcription_records
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// All of a user's finished transcriptions, newest first.
    pub async fn records_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<TranscriptionRecord>, RecordError> {
        let records = sqlx::query_as::<_, TranscriptionRecord>(
            r#"
            SELECT job_id, user_id, filename, duration_secs, model, language,
                   elapsed_secs, transcript_key, completed_at
            FROM transcription_records
            WHERE user_id = $1
            ORDER BY completed_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
