use crate::job_handle::SqliteJobHandle;
use crate::types::{Eligibility, JobRow, StoredState};
use anyhow::Context;
use async_trait::async_trait;
use estafette::core::job::{JobDetails, JobState, QueueCounts, QueueHealth, QueueName};
use estafette::core::job_processor::JobProcessor;
use estafette::core::queue::{Queue, QueueError};
use estafette::core::{new_xid, DateTime, Duration, Utc, Xid};
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, SqlitePool};
use tracing::instrument;

/// Backoff applied when a job comes back for another attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base of the exponential pause between attempts.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_base: Duration::seconds(2),
        }
    }
}

impl RetryPolicy {
    /// Pause before the next run, given how many attempts have happened.
    pub fn backoff_after(&self, attempts: u32) -> Duration {
        // Exponent capped so the shift cannot overflow; at that point the
        // pause is already measured in days.
        let factor = 1i32 << attempts.min(16);
        self.backoff_base * factor
    }
}

/// How long finished jobs stick around. The queue is a work list, not an
/// audit log.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub completed_max_age: Duration,
    pub completed_max_count: u32,
    pub failed_max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_max_age: Duration::hours(24),
            completed_max_count: 1000,
            failed_max_age: Duration::days(7),
        }
    }
}

/// An implementation of the Queue backed by SQLite.
///
/// Delayed jobs are ordinary rows whose `run_at` lies in the future, so a
/// reminder submitted 24 hours ahead survives process restarts. Claiming is
/// a single `UPDATE ... RETURNING` statement; SQLite serializes writers, so
/// no two consumers can check out the same row.
#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl SqliteQueue {
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(pool: SqlitePool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    /// Delete completed and failed jobs that outlived the retention policy.
    /// Returns how many rows went away.
    #[instrument(skip_all, err)]
    pub async fn sweep_retention(&self, policy: &RetentionPolicy) -> Result<u64, QueueError> {
        let now = Utc::now();
        let mut removed = 0u64;

        let completed_cutoff = now - policy.completed_max_age;
        removed += sqlx::query("DELETE FROM est_queue WHERE state = 'completed' AND finished_at < ?1")
            .bind(completed_cutoff)
            .execute(&self.pool)
            .await
            .context("Failed to sweep aged completed jobs")?
            .rows_affected();

        for queue in QueueName::ALL {
            removed += sqlx::query(
                "DELETE FROM est_queue WHERE state = 'completed' AND queue = ?1 AND jid NOT IN \
                 (SELECT jid FROM est_queue WHERE state = 'completed' AND queue = ?1 \
                  ORDER BY finished_at DESC LIMIT ?2)",
            )
            .bind(queue.as_str())
            .bind(policy.completed_max_count as i64)
            .execute(&self.pool)
            .await
            .context("Failed to trim completed jobs to retention count")?
            .rows_affected();
        }

        let failed_cutoff = now - policy.failed_max_age;
        removed += sqlx::query("DELETE FROM est_queue WHERE state = 'failed' AND finished_at < ?1")
            .bind(failed_cutoff)
            .execute(&self.pool)
            .await
            .context("Failed to sweep aged failed jobs")?
            .rows_affected();

        if removed > 0 {
            tracing::debug!(removed, "retention sweep removed finished jobs");
        }
        Ok(removed)
    }

    /// Hand jobs whose consumer died back to the queue. The extra attempt
    /// they consumed stays counted; delivery is at-least-once.
    #[instrument(skip_all, err)]
    pub async fn release_stalled(&self, older_than: Duration) -> Result<u64, QueueError> {
        let now = Utc::now();
        let cutoff = now - older_than;
        let released = sqlx::query(
            "UPDATE est_queue SET state = 'queued', started_at = NULL, run_at = ?1 \
             WHERE state = 'active' AND started_at < ?2",
        )
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("Failed to release stalled jobs")?
        .rows_affected();
        if released > 0 {
            tracing::warn!(released, "released stalled jobs back to their queues");
        }
        Ok(released)
    }
}

#[async_trait]
impl Queue for SqliteQueue {
    type JobHandle = SqliteJobHandle;

    #[instrument(skip_all, err, fields(job_type = J::name(), queue = %J::queue(), payload_size))]
    async fn schedule_at<J>(
        &self,
        payload: J::Payload,
        scheduled_at: DateTime,
        priority: i8,
    ) -> Result<Option<Xid>, QueueError>
    where
        J: JobProcessor + 'static,
        J::Payload: Serialize + Send,
    {
        let payload = serde_json::to_vec(&payload)?;
        let jid = new_xid();
        let jid_string = jid.to_string();

        tracing::Span::current().record("payload_size", payload.len());

        sqlx::query(
            "INSERT INTO est_queue (jid, queue, job_type, payload, priority, max_attempts, scheduled_at, run_at, enqueued_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8)",
        )
        .bind(jid_string)
        .bind(J::queue().as_str())
        .bind(J::name())
        .bind(payload)
        .bind(priority as i64)
        .bind(J::max_attempts() as i64)
        .bind(scheduled_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to add job to the queue")?;
        Ok(Some(jid))
    }

    #[instrument(skip_all, err)]
    async fn poll_next_with_instant(
        &self,
        queue: QueueName,
        job_types: &[&str],
        now: DateTime,
    ) -> Result<Option<SqliteJobHandle>, QueueError> {
        if job_types.is_empty() {
            return Ok(None);
        }
        let mut builder = QueryBuilder::new("UPDATE est_queue SET state = 'active', started_at = ");
        let query = {
            builder.push_bind(now);
            builder.push(", attempts = attempts + 1 WHERE jid IN (SELECT jid FROM est_queue WHERE state = 'queued' AND queue = ");
            builder.push_bind(queue.as_str());
            builder.push(" AND run_at <= ");
            builder.push_bind(now);
            builder.push(" AND job_type IN (");
            {
                let mut separated = builder.separated(",");
                for job_type in job_types {
                    separated.push_bind(*job_type);
                }
            }
            builder.push(") ORDER BY run_at ASC, priority ASC, jid ASC LIMIT 1) RETURNING *");
            builder.build()
        };
        let row = query
            .try_map(|row| JobRow::from_row(&row))
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check out a job from the queue")?;

        if let Some(row) = row {
            Ok(Some(SqliteJobHandle::new(
                row,
                self.pool.clone(),
                self.retry.clone(),
            )))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip_all, err, fields(jid = %job_id.to_string()))]
    async fn cancel_job(&self, job_id: Xid) -> Result<(), QueueError> {
        let jid = job_id.to_string();
        let result = sqlx::query("DELETE FROM est_queue WHERE jid = ?1 AND state = 'queued'")
            .bind(jid)
            .execute(&self.pool)
            .await
            .context("Failed to cancel job")?;
        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job_id));
        }
        Ok(())
    }

    async fn health(&self) -> QueueHealth {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => QueueHealth::Healthy,
            Err(e) => QueueHealth::Unhealthy(e.to_string()),
        }
    }

    #[instrument(skip_all, err, fields(queue = %queue))]
    async fn counts(&self, queue: QueueName) -> Result<QueueCounts, QueueError> {
        let now = Utc::now();
        let row = sqlx::query(
            "SELECT \
               COALESCE(SUM(state = 'queued' AND run_at <= ?1), 0) AS waiting, \
               COALESCE(SUM(state = 'queued' AND run_at > ?1), 0) AS delayed, \
               COALESCE(SUM(state = 'active'), 0) AS active, \
               COALESCE(SUM(state = 'completed'), 0) AS completed, \
               COALESCE(SUM(state = 'failed'), 0) AS failed \
             FROM est_queue WHERE queue = ?2",
        )
        .bind(now)
        .bind(queue.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to count jobs")?;

        use sqlx::Row;
        Ok(QueueCounts {
            waiting: row.try_get::<i64, _>("waiting").context("waiting count")? as u64,
            delayed: row.try_get::<i64, _>("delayed").context("delayed count")? as u64,
            active: row.try_get::<i64, _>("active").context("active count")? as u64,
            completed: row.try_get::<i64, _>("completed").context("completed count")? as u64,
            failed: row.try_get::<i64, _>("failed").context("failed count")? as u64,
        })
    }

    #[instrument(skip_all, err, fields(queue = %queue, state = %state))]
    async fn list_jobs(
        &self,
        queue: QueueName,
        state: JobState,
        limit: u32,
    ) -> Result<Vec<JobDetails>, QueueError> {
        let now = Utc::now();
        let (stored, eligibility) = StoredState::for_public(state);
        let mut builder =
            QueryBuilder::new("SELECT * FROM est_queue WHERE queue = ");
        builder.push_bind(queue.as_str());
        builder.push(" AND state = ");
        builder.push_bind(stored.as_str());
        match eligibility {
            Some(Eligibility::Due) => {
                builder.push(" AND run_at <= ");
                builder.push_bind(now);
            }
            Some(Eligibility::NotDue) => {
                builder.push(" AND run_at > ");
                builder.push_bind(now);
            }
            None => {}
        }
        match state {
            JobState::Waiting => builder.push(" ORDER BY run_at ASC, priority ASC, jid ASC"),
            JobState::Delayed => builder.push(" ORDER BY run_at ASC"),
            JobState::Active => builder.push(" ORDER BY started_at DESC"),
            JobState::Completed | JobState::Failed => builder.push(" ORDER BY finished_at DESC"),
        };
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);

        let rows = builder
            .build()
            .try_map(|row| JobRow::from_row(&row))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list jobs")?;

        Ok(rows.into_iter().map(|row| row.into_details(now)).collect())
    }

    #[instrument(skip_all, err, fields(queue = %queue, jid = %job_id.to_string()))]
    async fn get_job(
        &self,
        queue: QueueName,
        job_id: Xid,
    ) -> Result<Option<JobDetails>, QueueError> {
        let jid = job_id.to_string();
        let row = sqlx::query("SELECT * FROM est_queue WHERE queue = ?1 AND jid = ?2")
            .bind(queue.as_str())
            .bind(jid)
            .try_map(|row| JobRow::from_row(&row))
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch job")?;
        Ok(row.map(|row| row.into_details(Utc::now())))
    }

    #[instrument(skip_all, err, fields(queue = %queue, jid = %job_id.to_string()))]
    async fn retry_job(&self, queue: QueueName, job_id: Xid) -> Result<(), QueueError> {
        let jid = job_id.to_string();
        let result = sqlx::query(
            "UPDATE est_queue SET state = 'queued', attempts = 0, run_at = ?1, \
             started_at = NULL, finished_at = NULL \
             WHERE queue = ?2 AND jid = ?3 AND state = 'failed'",
        )
        .bind(Utc::now())
        .bind(queue.as_str())
        .bind(jid)
        .execute(&self.pool)
        .await
        .context("Failed to retry job")?;
        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job_id));
        }
        Ok(())
    }

    #[instrument(skip_all, err, fields(queue = %queue, state = %state))]
    async fn purge(
        &self,
        queue: QueueName,
        state: JobState,
        older_than: Duration,
    ) -> Result<u64, QueueError> {
        if state == JobState::Active {
            tracing::warn!("refusing to purge active jobs");
            return Ok(0);
        }
        let now = Utc::now();
        let cutoff = now - older_than;
        let (stored, eligibility) = StoredState::for_public(state);

        let mut builder = QueryBuilder::new("DELETE FROM est_queue WHERE queue = ");
        builder.push_bind(queue.as_str());
        builder.push(" AND state = ");
        builder.push_bind(stored.as_str());
        match eligibility {
            Some(Eligibility::Due) => {
                builder.push(" AND run_at <= ");
                builder.push_bind(now);
            }
            Some(Eligibility::NotDue) => {
                builder.push(" AND run_at > ");
                builder.push_bind(now);
            }
            None => {}
        }
        // Finished jobs age from their finish, the rest from submission.
        match state {
            JobState::Completed | JobState::Failed => builder.push(" AND finished_at < "),
            _ => builder.push(" AND enqueued_at < "),
        };
        builder.push_bind(cutoff);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to purge jobs")?;
        Ok(result.rows_affected())
    }
}
