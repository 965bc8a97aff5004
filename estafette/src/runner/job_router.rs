use super::wrapped_job::{BoxedJobHandler, WrappedJobHandler};
use crate::core::job::QueueName;
use crate::core::job_handle::JobHandle;
use crate::core::job_processor::{JobError, JobProcessor};
use crate::core::queue::{Queue, QueueError};
use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// A job processor router. Matches job type to job processor implementation.
/// This type requires that your job payloads implement `Serialize` and `Deserialize`.
///
/// ## Example
/// ```rust
/// use estafette::prelude::{JobProcessor, RunnerRouter, QueueName, Xid, CancellationToken};
/// use serde::{Deserialize, Serialize};
/// struct MyJob;
/// #[derive(Serialize, Deserialize)]
/// struct MyJobPayload(u8, String);
///
/// #[async_trait::async_trait]
/// impl JobProcessor for MyJob {
///     type Payload = MyJobPayload;
///     type Error = anyhow::Error;
///
///     fn name() -> &'static str {
///         "my_job"
///     }
///
///     fn queue() -> QueueName {
///         QueueName::Automations
///     }
///
///     async fn handle(&self, jid: Xid, payload: Self::Payload, cancellation_token: CancellationToken) -> Result<(), Self::Error> {
///         // ..do work
///         Ok(())
///     }
/// }
///
/// let router = {
///     let mut r = RunnerRouter::default();
///     r.add_job_handler(MyJob);
///     r
/// };
///
///```
#[derive(Default)]
pub struct RunnerRouter {
    jobs: HashMap<&'static str, BoxedJobHandler>,
    queues: BTreeMap<QueueName, Vec<&'static str>>,
}

impl RunnerRouter {
    /// Register a job handler with the router. If job by that name already present, it will get replaced.
    pub fn add_job_handler<J>(&mut self, job: J)
    where
        J: JobProcessor + 'static,
        J::Payload: Serialize + DeserializeOwned,
        J::Error: Into<JobError>,
    {
        let name = J::name();
        let boxed = WrappedJobHandler::new(job).boxed();
        self.jobs.entry(name).or_insert(boxed);
        let types = self.queues.entry(J::queue()).or_default();
        if !types.contains(&name) {
            types.push(name);
        }
    }

    /// Queues that have at least one registered processor.
    pub fn queues(&self) -> Vec<QueueName> {
        self.queues.keys().copied().collect()
    }

    /// Job types served for one queue.
    pub fn types_for(&self, queue: QueueName) -> Vec<&'static str> {
        self.queues.get(&queue).cloned().unwrap_or_default()
    }

    /// Process job handle. This function is responsible for job lifecycle. If you're implementing
    /// your own job runner, then this is what you should use to process a job that is already
    /// pulled from the queue. In all other cases, you shouldn't use this function directly.
    #[instrument(skip_all, err, fields(job_type = %job_handle.job_type(), jid = %job_handle.id().to_string(), attempt = job_handle.attempt()))]
    pub async fn process<H: JobHandle>(
        &self,
        job_handle: H,
        cancellation_token: CancellationToken,
    ) -> Result<(), RunnerError> {
        if let Some(r) = self.jobs.get(job_handle.job_type()) {
            match r
                .handle(job_handle.id(), job_handle.payload(), cancellation_token)
                .await
                .map_err(JobError::from)
            {
                Ok(_) => {
                    job_handle.complete().await?;
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("Error during job processing: {}", e);
                    if job_handle.attempt() >= job_handle.max_attempts() {
                        tracing::warn!(
                            "Parking job {} as failed after {} attempts",
                            job_handle.id().to_string(),
                            job_handle.attempt()
                        );
                        job_handle.discard().await?;
                        Ok(())
                    } else {
                        job_handle.retry_later().await?;
                        Ok(())
                    }
                }
            }
        } else {
            Err(RunnerError::UnknownJobType(
                job_handle.job_type().to_string(),
            ))
        }
    }

    /// In a loop, poll one queue with interval (passes interval to `Queue::next`) and process
    /// incoming jobs. Function processes jobs one-by-one without job-level concurrency. If you
    /// need concurrency, look at the `JobRunner` instead.
    pub async fn listen<Q, QR>(
        &self,
        queue_name: QueueName,
        queue: Q,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) where
        Q: AsRef<QR>,
        QR: Queue,
    {
        let job_types = self.types_for(queue_name);
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = queue.as_ref().next(queue_name, &job_types, poll_interval) => next,
            };
            match next {
                Ok(handle) => match self.process(handle, shutdown.child_token()).await {
                    Ok(_) => {}
                    Err(RunnerError::QueueError(e)) => handle_queue_error(e).await,
                    Err(RunnerError::UnknownJobType(name)) => {
                        tracing::error!("Unknown job type: {}", name)
                    }
                },
                Err(e) => {
                    handle_queue_error(e).await;
                }
            }
        }
    }
}

/// Errors returned by the router.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Runner is not configured to run this job type: {0}")]
    UnknownJobType(String),
    #[error(transparent)]
    QueueError(#[from] QueueError),
}

async fn handle_queue_error(error: QueueError) {
    tracing::error!("Encountered QueueError: {}", error);
    tracing::warn!("Suspending worker for 5 seconds");
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
}
