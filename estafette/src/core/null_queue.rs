use async_trait::async_trait;
use serde::Serialize;

use crate::core::job::{JobDetails, JobState, QueueCounts, QueueHealth, QueueName};
use crate::core::job_handle::JobHandle;
use crate::core::job_processor::JobProcessor;
use crate::core::queue::{Queue, QueueError};
use crate::core::{Bytes, DateTime, Duration, Xid};

/// The queue used when no backing store is configured.
///
/// Every submission is dropped with a warning and `Ok(None)`, every read
/// comes back empty, and nothing ever errors. The surrounding application
/// keeps working with background automation switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullQueue;

impl NullQueue {
    pub fn new() -> Self {
        Self
    }
}

/// Uninhabited: the null queue never hands out a job.
pub enum NullJobHandle {}

#[async_trait]
impl JobHandle for NullJobHandle {
    fn id(&self) -> Xid {
        match *self {}
    }

    fn queue(&self) -> QueueName {
        match *self {}
    }

    fn job_type(&self) -> &str {
        match *self {}
    }

    fn payload(&self) -> Bytes {
        match *self {}
    }

    fn attempt(&self) -> u32 {
        match *self {}
    }

    fn max_attempts(&self) -> u32 {
        match *self {}
    }

    async fn complete(self) -> Result<(), QueueError> {
        match self {}
    }

    async fn retry_later(self) -> Result<(), QueueError> {
        match self {}
    }

    async fn discard(self) -> Result<(), QueueError> {
        match self {}
    }
}

#[async_trait]
impl Queue for NullQueue {
    type JobHandle = NullJobHandle;

    async fn schedule_at<J>(
        &self,
        _payload: J::Payload,
        _scheduled_at: DateTime,
        _priority: i8,
    ) -> Result<Option<Xid>, QueueError>
    where
        J: JobProcessor + 'static,
        J::Payload: Serialize + Send,
    {
        tracing::warn!(
            job_type = J::name(),
            queue = %J::queue(),
            "queue backend not configured, job dropped"
        );
        Ok(None)
    }

    async fn poll_next_with_instant(
        &self,
        _queue: QueueName,
        _job_types: &[&str],
        _time: DateTime,
    ) -> Result<Option<Self::JobHandle>, QueueError> {
        Ok(None)
    }

    async fn cancel_job(&self, job_id: Xid) -> Result<(), QueueError> {
        tracing::warn!(jid = %job_id, "queue backend not configured, nothing to cancel");
        Ok(())
    }

    async fn health(&self) -> QueueHealth {
        QueueHealth::Disabled
    }

    async fn counts(&self, _queue: QueueName) -> Result<QueueCounts, QueueError> {
        Ok(QueueCounts::default())
    }

    async fn list_jobs(
        &self,
        _queue: QueueName,
        _state: JobState,
        _limit: u32,
    ) -> Result<Vec<JobDetails>, QueueError> {
        Ok(Vec::new())
    }

    async fn get_job(
        &self,
        _queue: QueueName,
        _job_id: Xid,
    ) -> Result<Option<JobDetails>, QueueError> {
        Ok(None)
    }

    async fn retry_job(&self, _queue: QueueName, job_id: Xid) -> Result<(), QueueError> {
        Err(QueueError::JobNotFound(job_id))
    }

    async fn purge(
        &self,
        _queue: QueueName,
        _state: JobState,
        _older_than: Duration,
    ) -> Result<u64, QueueError> {
        Ok(0)
    }
}
