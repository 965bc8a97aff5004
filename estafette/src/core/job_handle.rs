use crate::core::job::QueueName;
use crate::core::queue::QueueError;
use crate::core::{Bytes, Xid};
use async_trait::async_trait;

/// Job lifecycle handler and metadata provider. For an example implementation look at the
/// `estafette_sqlite` crate.
///
/// A handle represents an exclusive claim: as long as it is alive, no other
/// consumer can see the job. Every lifecycle method consumes the handle.
#[async_trait]
pub trait JobHandle: Send + Sync {
    // Get job id
    fn id(&self) -> Xid;
    // Which queue the job belongs to
    fn queue(&self) -> QueueName;
    // Get job type
    fn job_type(&self) -> &str;
    // Get job payload.
    fn payload(&self) -> Bytes;
    // How many times this job has run, the current run included.
    fn attempt(&self) -> u32;
    // How many runs the job gets before it is parked.
    fn max_attempts(&self) -> u32;
    // Mark the job as completed successfully.
    async fn complete(mut self) -> Result<(), QueueError>;
    // Hand the job back for another attempt after a backoff pause.
    async fn retry_later(mut self) -> Result<(), QueueError>;
    // Park the job as permanently failed; it stays around for inspection.
    async fn discard(mut self) -> Result<(), QueueError>;
}
