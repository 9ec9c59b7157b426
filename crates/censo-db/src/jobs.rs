//! `SQLite`-backed job queue.

use crate::error::{DatabaseError, Result};
use async_trait::async_trait;
use censo_scheduler::{format_timestamp, JobQueue, JobRequest, JobState, JobType, QueuedJob};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const JOB_COLUMNS: &str =
    "id, name, payload, run_at, state, created_at, started_at, finished_at, error";

/// Durable job queue stored in the `queued_jobs` table.
#[derive(Debug, Clone)]
pub struct SqliteJobQueue {
    pool: SqlitePool,
}

impl SqliteJobQueue {
    /// Create a queue over an existing pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All jobs with the given name, oldest first.
    pub async fn jobs_named(&self, name: &str) -> Result<Vec<QueuedJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM queued_jobs WHERE name = ? ORDER BY id"
        ))
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    /// All jobs still waiting to run, soonest first.
    pub async fn queued_jobs(&self) -> Result<Vec<QueuedJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM queued_jobs WHERE state = 'Queued' ORDER BY run_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    /// Put jobs left `Running` by a crashed worker back in the queue.
    pub async fn requeue_running(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE queued_jobs SET state = 'Queued', started_at = NULL
             WHERE state = 'Running'
               AND NOT EXISTS (
                   SELECT 1 FROM queued_jobs q
                   WHERE q.name = queued_jobs.name AND q.state = 'Queued'
               )",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert(&self, request: &JobRequest) -> Result<bool> {
        let payload = serde_json::to_string(&request.job_type)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO queued_jobs (name, payload, run_at, state, created_at)
             VALUES (?, ?, ?, 'Queued', ?)",
        )
        .bind(&request.name)
        .bind(payload)
        .bind(format_timestamp(request.run_at))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>> {
        let now = format_timestamp(now);
        let row = sqlx::query(&format!(
            "UPDATE queued_jobs SET state = 'Running', started_at = ?
             WHERE id = (
                 SELECT id FROM queued_jobs
                 WHERE state = 'Queued' AND run_at <= ?
                 ORDER BY run_at, id
                 LIMIT 1
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(&now)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn finish(&self, job_id: i64, state: JobState, error: Option<&str>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE queued_jobs SET state = ?, finished_at = ?, error = ? WHERE id = ?",
        )
        .bind(state.as_str())
        .bind(format_timestamp(Utc::now()))
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFoundWithMessage(format!(
                "Queued job {job_id} not found"
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(&self, request: JobRequest) -> censo_scheduler::queue::Result<bool> {
        let inserted = self.insert(&request).await?;
        if inserted {
            tracing::debug!(job = %request.name, run_at = %request.run_at, "Job enqueued");
        } else {
            tracing::debug!(job = %request.name, "Job already queued, skipping");
        }
        Ok(inserted)
    }

    async fn claim_next_due(
        &self,
        now: DateTime<Utc>,
    ) -> censo_scheduler::queue::Result<Option<QueuedJob>> {
        Ok(self.claim(now).await?)
    }

    async fn complete(&self, job_id: i64) -> censo_scheduler::queue::Result<()> {
        Ok(self.finish(job_id, JobState::Done, None).await?)
    }

    async fn fail(&self, job_id: i64, error: &str) -> censo_scheduler::queue::Result<()> {
        Ok(self.finish(job_id, JobState::Failed, Some(error)).await?)
    }
}

fn job_from_row(row: &SqliteRow) -> Result<QueuedJob> {
    let payload: String = row.try_get("payload")?;
    let state: String = row.try_get("state")?;

    let job_type: JobType = serde_json::from_str(&payload)
        .map_err(|e| DatabaseError::Decode(format!("Invalid payload '{payload}': {e}")))?;

    Ok(QueuedJob {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        job_type,
        run_at: row.try_get("run_at")?,
        state: state.parse().map_err(DatabaseError::Decode)?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        error: row.try_get("error")?,
    })
}
