pub use xid::new as new_xid;
pub use xid::Id as Xid;

pub type DateTime = chrono::DateTime<chrono::Utc>;
pub use bytes::Bytes;
pub use chrono::{Duration, Utc};
pub use tokio_util::sync::CancellationToken;

pub mod job;
pub mod job_handle;
pub mod job_processor;
pub mod null_queue;
pub mod queue;

/// How many times a job runs before it is parked for inspection, unless the
/// processor overrides it.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
