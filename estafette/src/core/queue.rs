use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::core::job::{JobDetails, JobState, QueueCounts, QueueHealth, QueueName};
use crate::core::job_handle::JobHandle;
use crate::core::job_processor::JobProcessor;
use crate::core::{DateTime, Duration, Xid};

/// An interface to queue implementation. Responsible for pushing jobs into the queue and pulling
/// jobs out of the queue.
///
/// Two implementations exist: a durable store-backed queue and
/// [`NullQueue`](crate::core::null_queue::NullQueue), which accepts every call
/// and does nothing. Which one a process uses is decided once at startup and
/// injected; callers never probe for connectivity themselves. That is why the
/// scheduling methods return `Option<Xid>`: `None` means the job was dropped
/// (backend disabled) or not submitted by policy, never an error.
///
/// ### Ordering
///
/// Within one queue, jobs are served in re-eligibility order; among jobs that
/// are ready at the same instant, a lower `priority` value wins, and ties go
/// to the earlier submission.
#[async_trait]
pub trait Queue: Send + Sync {
    type JobHandle: JobHandle;

    /// Schedule a job to run at the future time.
    async fn schedule_at<J>(
        &self,
        payload: J::Payload,
        scheduled_at: DateTime,
        priority: i8,
    ) -> Result<Option<Xid>, QueueError>
    where
        J: JobProcessor + 'static,
        J::Payload: Serialize + Send;

    /// Schedule a job to run next. Depending on queue backlog this may start running later than you expect.
    async fn schedule<J>(&self, payload: J::Payload, priority: i8) -> Result<Option<Xid>, QueueError>
    where
        J: JobProcessor + 'static,
        J::Payload: Serialize + Send,
    {
        self.schedule_at::<J>(payload, Utc::now(), priority).await
    }

    /// Schedule a job to run at the future time relative to now.
    async fn schedule_in<J>(
        &self,
        payload: J::Payload,
        scheduled_in: Duration,
        priority: i8,
    ) -> Result<Option<Xid>, QueueError>
    where
        J: JobProcessor + 'static,
        J::Payload: Serialize + Send,
    {
        let when = Utc::now() + scheduled_in;
        self.schedule_at::<J>(payload, when, priority).await
    }

    /// Poll the queue, implementation should not wait for next job, if there is nothing return `Ok(None)`.
    /// Claiming must be atomic: a job handed to one consumer is invisible to every other.
    async fn poll_next_with_instant(
        &self,
        queue: QueueName,
        job_types: &[&str],
        time: DateTime,
    ) -> Result<Option<Self::JobHandle>, QueueError>;

    /// Poll the queue, implementation should not wait for next job, if there is nothing return `Ok(None)`.
    async fn poll_next(
        &self,
        queue: QueueName,
        job_types: &[&str],
    ) -> Result<Option<Self::JobHandle>, QueueError> {
        self.poll_next_with_instant(queue, job_types, Utc::now())
            .await
    }

    /// Await next job. Default implementation polls the queue with defined interval until there is something.
    async fn next(
        &self,
        queue: QueueName,
        job_types: &[&str],
        interval: Duration,
    ) -> Result<Self::JobHandle, QueueError> {
        let duration = interval
            .to_std()
            .map_err(|_| QueueError::InvalidInterval(interval))?;
        let mut interval = tokio::time::interval(duration);
        loop {
            interval.tick().await;
            let job = self.poll_next(queue, job_types).await?;
            if let Some(job) = job {
                break Ok(job);
            }
        }
    }

    /// Cancel a job that has been scheduled. This will only cancel if the job hasn't started yet.
    async fn cancel_job(&self, job_id: Xid) -> Result<(), QueueError>;

    /// Reachability of the backing store.
    async fn health(&self) -> QueueHealth;

    /// Job counts by state for one queue.
    async fn counts(&self, queue: QueueName) -> Result<QueueCounts, QueueError>;

    /// List jobs of one queue in a given state, most relevant first.
    async fn list_jobs(
        &self,
        queue: QueueName,
        state: JobState,
        limit: u32,
    ) -> Result<Vec<JobDetails>, QueueError>;

    /// Look a single job up by id.
    async fn get_job(&self, queue: QueueName, job_id: Xid)
        -> Result<Option<JobDetails>, QueueError>;

    /// Put a failed job back in line for another round of attempts.
    async fn retry_job(&self, queue: QueueName, job_id: Xid) -> Result<(), QueueError>;

    /// Delete jobs of one state that finished (or were enqueued) before
    /// `older_than` ago. Returns how many rows went away.
    async fn purge(
        &self,
        queue: QueueName,
        state: JobState,
        older_than: Duration,
    ) -> Result<u64, QueueError>;
}

/// Errors related to queue operation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum QueueError {
    /// Encountered an error when encoding or decoding a job payload.
    #[error("Failed to encode or decode job payload")]
    PayloadCodec {
        #[from]
        source: serde_json::Error,
    },
    #[error("Interval must be greater than zero: {0:?}")]
    InvalidInterval(Duration),
    #[error("Job by that ID does not exist: {0}")]
    JobNotFound(Xid),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
