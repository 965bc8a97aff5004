use estafette::core::job::{JobDetails, JobState, QueueName};
use estafette::core::{Bytes, DateTime, Xid};
use sqlx::sqlite::SqliteRow;
use sqlx::{Error, FromRow, Row};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub(crate) struct JobRow {
    pub jid: Xid,
    pub queue: QueueName,
    pub job_type: String,
    pub payload: Bytes,
    pub priority: i8,
    pub stored_state: StoredState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub scheduled_at: DateTime,
    pub run_at: DateTime,
    pub enqueued_at: DateTime,
    pub started_at: Option<DateTime>,
    pub finished_at: Option<DateTime>,
}

/// What the `state` column actually holds. The waiting/delayed distinction
/// is not stored; it falls out of comparing `run_at` with the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoredState {
    Queued,
    Active,
    Completed,
    Failed,
}

impl StoredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoredState::Queued => "queued",
            StoredState::Active => "active",
            StoredState::Completed => "completed",
            StoredState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "queued" => Ok(StoredState::Queued),
            "active" => Ok(StoredState::Active),
            "completed" => Ok(StoredState::Completed),
            "failed" => Ok(StoredState::Failed),
            other => Err(format!("unknown stored job state: {other}")),
        }
    }

    /// The column value(s) and eligibility comparison backing one public state.
    pub fn for_public(state: JobState) -> (StoredState, Option<Eligibility>) {
        match state {
            JobState::Waiting => (StoredState::Queued, Some(Eligibility::Due)),
            JobState::Delayed => (StoredState::Queued, Some(Eligibility::NotDue)),
            JobState::Active => (StoredState::Active, None),
            JobState::Completed => (StoredState::Completed, None),
            JobState::Failed => (StoredState::Failed, None),
        }
    }
}

/// Whether `run_at` has been reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Eligibility {
    Due,
    NotDue,
}

impl<'r> FromRow<'r, SqliteRow> for JobRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, Error> {
        let jid = row
            .try_get("jid")
            .map(Xid::from_str)?
            .map_err(|xid_err| Error::Decode(Box::new(xid_err)))?;
        let queue = row
            .try_get("queue")
            .map(|q: String| QueueName::from_str(&q))?
            .map_err(|queue_err| Error::Decode(Box::new(queue_err)))?;
        let job_type = row.try_get("job_type")?;
        let payload = row.try_get::<Vec<u8>, _>("payload").map(Bytes::from)?;
        let priority: i8 = row.try_get::<i64, _>("priority")? as i8;
        let stored_state = row
            .try_get("state")
            .map(|s: String| StoredState::parse(&s))?
            .map_err(|state_err| Error::Decode(state_err.into()))?;
        let attempts: u32 = row.try_get::<i64, _>("attempts")? as u32;
        let max_attempts: u32 = row.try_get::<i64, _>("max_attempts")? as u32;
        let scheduled_at = row.try_get("scheduled_at")?;
        let run_at = row.try_get("run_at")?;
        let enqueued_at = row.try_get("enqueued_at")?;
        let started_at = row.try_get("started_at")?;
        let finished_at = row.try_get("finished_at")?;
        Ok(Self {
            jid,
            queue,
            job_type,
            payload,
            priority,
            stored_state,
            attempts,
            max_attempts,
            scheduled_at,
            run_at,
            enqueued_at,
            started_at,
            finished_at,
        })
    }
}

impl JobRow {
    pub fn public_state(&self, now: DateTime) -> JobState {
        match self.stored_state {
            StoredState::Queued if self.run_at > now => JobState::Delayed,
            StoredState::Queued => JobState::Waiting,
            StoredState::Active => JobState::Active,
            StoredState::Completed => JobState::Completed,
            StoredState::Failed => JobState::Failed,
        }
    }

    pub fn into_details(self, now: DateTime) -> JobDetails {
        let state = self.public_state(now);
        let payload = serde_json::from_slice(self.payload.as_ref())
            .unwrap_or(serde_json::Value::Null);
        JobDetails {
            id: self.jid.to_string(),
            queue: self.queue,
            job_type: self.job_type,
            state,
            priority: self.priority,
            payload,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            scheduled_at: self.scheduled_at,
            run_at: self.run_at,
            enqueued_at: self.enqueued_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}
