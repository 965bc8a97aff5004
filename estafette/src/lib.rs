#![doc = include_str!("../README.md")]

pub mod core;

/// Turning domain events into job submissions.
pub mod dispatch;
/// Job payload contracts, channel adapter traits and job processors.
pub mod jobs;
/// Computing absolute dispatch times from event-relative offsets.
pub mod scheduler;

/// Default implementation of job runner.
#[cfg(feature = "runner")]
pub mod runner {
    pub mod job_router;
    pub mod job_runner;
    pub mod wrapped_job;
}

/// Re-exports to simplify importing this crate types.
pub mod prelude {
    pub use super::core::{
        job::{JobDetails, JobState, QueueCounts, QueueHealth, QueueName},
        job_handle::JobHandle,
        job_processor::{JobError, JobProcessor},
        null_queue::NullQueue,
        queue::{Queue, QueueError},
        CancellationToken, Duration, Xid,
    };
    pub use super::dispatch::Dispatcher;
    #[cfg(feature = "runner")]
    pub use super::runner::{
        job_router::RunnerRouter,
        job_runner::{JobRunner, WorkerConfig},
    };
    pub use super::scheduler::DelayScheduler;
}
