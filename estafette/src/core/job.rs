use crate::core::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The fixed set of delivery channels. Every job belongs to exactly one
/// queue; there is no ordering between queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Automations,
    Notifications,
    Email,
    Messaging,
    Reports,
}

impl QueueName {
    pub const ALL: [QueueName; 5] = [
        QueueName::Automations,
        QueueName::Notifications,
        QueueName::Email,
        QueueName::Messaging,
        QueueName::Reports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Automations => "automations",
            QueueName::Notifications => "notifications",
            QueueName::Email => "email",
            QueueName::Messaging => "messaging",
            QueueName::Reports => "reports",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("Unknown queue name: {0}")]
pub struct UnknownQueue(pub String);

impl FromStr for QueueName {
    type Err = UnknownQueue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automations" => Ok(QueueName::Automations),
            "notifications" => Ok(QueueName::Notifications),
            "email" => Ok(QueueName::Email),
            "messaging" => Ok(QueueName::Messaging),
            "reports" => Ok(QueueName::Reports),
            other => Err(UnknownQueue(other.to_string())),
        }
    }
}

/// Lifecycle of a job as seen from the outside.
///
/// `Waiting` and `Delayed` are both backed by the same queued record; which
/// one a job reports depends on whether its re-eligibility time has been
/// reached yet. The transition happens by the clock alone, no writer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("Unknown job state: {0}")]
pub struct UnknownJobState(pub String);

impl FromStr for JobState {
    type Err = UnknownJobState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "delayed" => Ok(JobState::Delayed),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(UnknownJobState(other.to_string())),
        }
    }
}

/// Per-queue job counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.waiting + self.delayed + self.active + self.completed + self.failed
    }
}

/// Snapshot of a single job, as returned by the administrative surface.
/// The payload is carried verbatim; the queue itself never interprets it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetails {
    pub id: String,
    pub queue: QueueName,
    pub job_type: String,
    pub state: JobState,
    pub priority: i8,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub max_attempts: u32,
    /// Original dispatch time. Never changes once the job is submitted.
    pub scheduled_at: DateTime,
    /// Current re-eligibility time; moves forward on every retry.
    pub run_at: DateTime,
    pub enqueued_at: DateTime,
    pub started_at: Option<DateTime>,
    pub finished_at: Option<DateTime>,
}

/// Reachability of the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueHealth {
    Healthy,
    /// No store is configured; the queue drops everything it is given.
    Disabled,
    Unhealthy(String),
}
