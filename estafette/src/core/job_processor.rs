use crate::core::job::QueueName;
use crate::core::{Xid, DEFAULT_MAX_ATTEMPTS};
use async_trait::async_trait;
use std::convert::Infallible;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A job-handler interface. Your Payload should implement `serde::Serialize` and
/// `serde::Deserialize` if you're planning to use it with the runner and Queue from this crate.
///
/// ## Example
/// ```rust
/// use estafette::prelude::{JobProcessor, QueueName, Xid, CancellationToken};
/// use serde::{Deserialize, Serialize};
/// struct MyJob;
///
/// impl MyJob {
///     async fn do_work(&self) -> anyhow::Result<()> {
///         // ..do some work
///         Ok(())
///     }
/// }
///
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
///         tokio::select! {
///             result = self.do_work() => { result }
///             _ = cancellation_token.cancelled() => { Ok(()) }
///         }
///     }
/// }
/// ```
/// ## Services
/// If your job processor requires external services (i.e. a channel adapter, REST client, etc.),
/// add them directly as your struct fields.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// What is the input to this handler. If you want to use `RunnerRouter`, then this must
    /// implement `serde::Serialize` and `serde::de::DeserializeOwned`.
    type Payload: Send;
    /// What error is returned
    type Error: Send;
    /// Run the job, passing payload to it.
    /// You should listen for the `cancellation_token.cancelled()` event in order to handle
    /// shutdown requests gracefully.
    async fn handle(
        &self,
        jid: Xid,
        payload: Self::Payload,
        cancellation_token: CancellationToken,
    ) -> Result<(), Self::Error>;

    /// Job type, used to differentiate between different jobs in the queue.
    fn name() -> &'static str
    where
        Self: Sized;

    /// Which queue jobs of this type are submitted to and pulled from.
    fn queue() -> QueueName
    where
        Self: Sized;

    /// How many runs a job of this type gets before it is parked as failed.
    fn max_attempts() -> u32
    where
        Self: Sized,
    {
        DEFAULT_MAX_ATTEMPTS
    }
}

/// Error types returned by job processor that wraps your job processor.
#[derive(Error, Debug)]
pub enum JobError {
    /// Encountered an error when tried to deserialize the payload.
    #[error("Failed to deserialize job payload")]
    DecodeError {
        #[from]
        source: serde_json::Error,
    },

    /// Error originated in inner-job implementation
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<Infallible> for JobError {
    fn from(_: Infallible) -> Self {
        unreachable!();
    }
}
