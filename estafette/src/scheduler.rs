use crate::core::job_processor::JobProcessor;
use crate::core::queue::{Queue, QueueError};
use crate::core::{DateTime, Duration, Utc, Xid};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Schedules jobs relative to a future business event.
///
/// Automations never fire for events whose lead window has already elapsed:
/// if the computed dispatch time is not in the future, the job is not
/// submitted at all and `Ok(None)` comes back. Callers that need to cancel
/// later should hold on to the returned id.
pub struct DelayScheduler<Q> {
    queue: Arc<Q>,
}

impl<Q> Clone for DelayScheduler<Q> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<Q> DelayScheduler<Q>
where
    Q: Queue,
{
    pub fn new(queue: Arc<Q>) -> Self {
        Self { queue }
    }

    /// Submit a job to run `lead` ahead of `event_time`.
    #[instrument(skip(self, payload), fields(job_type = J::name()))]
    pub async fn schedule_before<J>(
        &self,
        event_time: DateTime,
        lead: Duration,
        payload: J::Payload,
        priority: i8,
    ) -> Result<Option<Xid>, QueueError>
    where
        J: JobProcessor + 'static,
        J::Payload: Serialize + Send,
    {
        let dispatch_at = event_time - lead;
        if dispatch_at <= Utc::now() {
            tracing::debug!(%dispatch_at, "dispatch time already elapsed, job not submitted");
            return Ok(None);
        }
        self.queue
            .schedule_at::<J>(payload, dispatch_at, priority)
            .await
    }
}
