use crate::queue::RetryPolicy;
use crate::types::JobRow;
use anyhow::Context;
use async_trait::async_trait;
use estafette::core::job::QueueName;
use estafette::core::job_handle::JobHandle;
use estafette::core::queue::QueueError;
use estafette::core::{Bytes, Utc, Xid};
use sqlx::SqlitePool;

pub struct SqliteJobHandle {
    pool: SqlitePool,
    row: JobRow,
    retry: RetryPolicy,
}

#[async_trait]
impl JobHandle for SqliteJobHandle {
    fn id(&self) -> Xid {
        self.row.jid
    }

    fn queue(&self) -> QueueName {
        self.row.queue
    }

    fn job_type(&self) -> &str {
        &self.row.job_type
    }

    fn payload(&self) -> Bytes {
        self.row.payload.clone()
    }

    fn attempt(&self) -> u32 {
        self.row.attempts
    }

    fn max_attempts(&self) -> u32 {
        self.row.max_attempts
    }

    async fn complete(mut self) -> Result<(), QueueError> {
        let jid = self.row.jid.to_string();
        sqlx::query("UPDATE est_queue SET state = 'completed', finished_at = ?1 WHERE jid = ?2")
            .bind(Utc::now())
            .bind(jid)
            .execute(&self.pool)
            .await
            .context("Failed to mark job as completed")?;
        Ok(())
    }

    async fn retry_later(mut self) -> Result<(), QueueError> {
        let jid = self.row.jid.to_string();
        let run_at = Utc::now() + self.retry.backoff_after(self.row.attempts);
        sqlx::query(
            "UPDATE est_queue SET state = 'queued', started_at = NULL, run_at = ?1 WHERE jid = ?2",
        )
        .bind(run_at)
        .bind(jid)
        .execute(&self.pool)
        .await
        .context("Failed to hand job back for retry")?;
        Ok(())
    }

    async fn discard(mut self) -> Result<(), QueueError> {
        let jid = self.row.jid.to_string();
        sqlx::query("UPDATE est_queue SET state = 'failed', finished_at = ?1 WHERE jid = ?2")
            .bind(Utc::now())
            .bind(jid)
            .execute(&self.pool)
            .await
            .context("Failed to park job as failed")?;
        Ok(())
    }
}

impl SqliteJobHandle {
    pub(crate) fn new(row: JobRow, pool: SqlitePool, retry: RetryPolicy) -> Self {
        Self { pool, row, retry }
    }
}
