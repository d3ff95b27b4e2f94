//! Job lifecycle operations.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{Store, StoreResult};
use crate::error::StoreError;
use crate::hash::content_hash;
use crate::models::{EnqueueResult, EnqueueStatus, Job, JobOutcome, JobState, QueueStats};

impl Store {
    /// Recovers from a unique-violation race on the partial index instead of
    /// treating it as a hard error -- that index is what enforces at most one
    /// active job per `(dedupe_key, content_hash)`, so losing the race just
    /// means someone else already created the active job.
    pub async fn enqueue(
        &self,
        file_id: &str,
        payload: serde_json::Value,
        priority: i32,
        max_attempts: i32,
    ) -> StoreResult<EnqueueResult> {
        let hash = content_hash(&payload);

        if let Some(existing) = self.find_dedupe_match(file_id, &hash).await? {
            return Ok(existing);
        }

        let id = Uuid::new_v4();
        let inserted = sqlx::query(
            r#"
            INSERT INTO jobs (id, file_id, dedupe_key, content_hash, payload, priority, state, attempts, max_attempts)
            VALUES ($1, $2, $2, $3, $4, $5, 'queued', 0, $6)
            "#,
        )
        .bind(id)
        .bind(file_id)
        .bind(&hash)
        .bind(&payload)
        .bind(priority)
        .bind(max_attempts)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(EnqueueResult {
                job_id: id,
                status: EnqueueStatus::Enqueued,
                result: None,
            }),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => self
                .find_dedupe_match(file_id, &hash)
                .await?
                .ok_or_else(|| {
                    StoreError::Database(sqlx::Error::Protocol(
                        "unique violation on enqueue but no dedupe match found on re-read".into(),
                    ))
                }),
            Err(other) => Err(StoreError::Database(other)),
        }
    }

    async fn find_dedupe_match(
        &self,
        file_id: &str,
        hash: &str,
    ) -> StoreResult<Option<EnqueueResult>> {
        let row = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE dedupe_key = $1 AND content_hash = $2
              AND state IN ('queued', 'processing', 'succeeded')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(file_id)
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|job| match job.state {
            JobState::Succeeded => EnqueueResult {
                job_id: job.id,
                status: EnqueueStatus::AlreadyCompleted,
                result: job.result,
            },
            _ => EnqueueResult {
                job_id: job.id,
                status: EnqueueStatus::AlreadyQueued,
                result: None,
            },
        }))
    }

    /// Atomic `queued -> processing` claim, highest priority/oldest first
    /// `FOR UPDATE SKIP LOCKED` lets
    /// concurrent workers skip past rows another worker is already claiming
    /// instead of blocking on them.
    pub async fn claim_next(&self, worker_id: &str) -> StoreResult<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            WITH candidate AS (
                SELECT id FROM jobs
                WHERE state = 'queued'
                ORDER BY priority DESC, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE jobs
            SET state = 'processing', locked_at = NOW(), worker_id = $1, updated_at = NOW()
            WHERE id = (SELECT id FROM candidate) AND state = 'queued'
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Retrying back to `queued` preserves `attempts`/`max_attempts`, which
    /// the caller already advanced via [`Store::increment_attempt`].
    pub async fn complete_job(
        &self,
        job_id: Uuid,
        outcome: JobOutcome,
        result: Option<&str>,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let state: JobState = outcome.target_state();

        let affected = sqlx::query(
            r#"
            UPDATE jobs
            SET state = $2, result = COALESCE($3, result), error = $4,
                locked_at = NULL, worker_id = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(state)
        .bind(result)
        .bind(error)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::JobNotFound(job_id));
        }
        Ok(())
    }

    /// `attempts += 1` then append a `JobAttempt` row, in one transaction, so
    /// the invariant `job.attempts == count(JobAttempt where job_id=...)`
    /// always holds.
    pub async fn increment_attempt(
        &self,
        job_id: Uuid,
        provider_id: Option<&str>,
        model_id: Option<&str>,
        success: bool,
        error: Option<&str>,
    ) -> StoreResult<i32> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "UPDATE jobs SET attempts = attempts + 1, updated_at = NOW() WHERE id = $1 RETURNING attempts",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::JobNotFound(job_id))?;

        let attempt_no: i32 = row.try_get("attempts")?;

        sqlx::query(
            r#"
            INSERT INTO job_attempts (job_id, attempt_no, provider_id, model_id, finished_at, success, error)
            VALUES ($1, $2, $3, $4, NOW(), $5, $6)
            "#,
        )
        .bind(job_id)
        .bind(attempt_no)
        .bind(provider_id)
        .bind(model_id)
        .bind(success)
        .bind(error)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(attempt_no)
    }

    /// Returns the number of jobs recovered.
    pub async fn recover_stale(&self, timeout: chrono::Duration) -> StoreResult<u64> {
        let cutoff = Utc::now() - timeout;

        let affected = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'failed', error = 'timed out', locked_at = NULL, worker_id = NULL, updated_at = NOW()
            WHERE state = 'processing' AND locked_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected)
    }

    pub async fn get_job(&self, job_id: Uuid) -> StoreResult<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    pub async fn queue_stats(&self) -> StoreResult<QueueStats> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS n FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let state: JobState = row.try_get("state")?;
            let n: i64 = row.try_get("n")?;
            match state {
                JobState::Queued => stats.queued = n,
                JobState::Processing => stats.processing = n,
                JobState::Succeeded => stats.succeeded = n,
                JobState::Failed => stats.failed = n,
                JobState::Dead => stats.dead = n,
            }
        }
        Ok(stats)
    }
}
