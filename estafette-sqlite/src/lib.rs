#![doc = include_str!("../README.md")]

pub mod job_handle;
pub mod queue;
pub mod types;

pub use queue::{RetentionPolicy, RetryPolicy, SqliteQueue};
use sqlx::migrate::Migrator;
pub static MIGRATOR: Migrator = sqlx::migrate!();

#[cfg(test)]
mod test {
    use crate::queue::{RetentionPolicy, SqliteQueue};
    use crate::MIGRATOR;
    use estafette::core::job::{JobState, QueueName};
    use estafette::core::job_handle::JobHandle;
    use estafette::core::job_processor::JobProcessor;
    use estafette::core::queue::{Queue, QueueError};
    use estafette::core::{CancellationToken, Duration, Utc, Xid};
    use estafette::runner::job_router::RunnerRouter;
    use estafette::scheduler::DelayScheduler;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[allow(dead_code)]
    pub fn setup_logger() {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .init();
    }

    async fn make_pool() -> SqlitePool {
        // A single long-lived connection: in-memory SQLite databases are
        // per-connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(":memory:")
            .await
            .unwrap();
        MIGRATOR.run(&pool).await.unwrap();
        pool
    }

    #[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
    struct TestPayload1 {
        arg1: i32,
        arg2: String,
    }

    impl Default for TestPayload1 {
        fn default() -> Self {
            Self {
                arg1: 1774,
                arg2: String::from("this is a test"),
            }
        }
    }

    struct TestJob1;

    #[async_trait]
    impl JobProcessor for TestJob1 {
        type Payload = TestPayload1;
        type Error = Infallible;

        async fn handle(
            &self,
            _jid: Xid,
            _payload: Self::Payload,
            _cancellation_token: CancellationToken,
        ) -> Result<(), Self::Error> {
            Ok(())
        }

        fn name() -> &'static str
        where
            Self: Sized,
        {
            "test_job_1"
        }

        fn queue() -> QueueName
        where
            Self: Sized,
        {
            QueueName::Messaging
        }
    }

    struct TestJob2;

    #[async_trait]
    impl JobProcessor for TestJob2 {
        type Payload = TestPayload1;
        type Error = Infallible;

        async fn handle(
            &self,
            _jid: Xid,
            _payload: Self::Payload,
            _cancellation_token: CancellationToken,
        ) -> Result<(), Self::Error> {
            Ok(())
        }

        fn name() -> &'static str
        where
            Self: Sized,
        {
            "test_job_2"
        }

        fn queue() -> QueueName
        where
            Self: Sized,
        {
            QueueName::Email
        }
    }

    #[tokio::test]
    async fn queue_smoke_test() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);

        // If there are no jobs, this should return Ok(None);
        {
            let job = queue
                .poll_next(QueueName::Messaging, &[TestJob1::name()])
                .await
                .unwrap();
            assert!(job.is_none());
        }
        // Schedule a job to run now
        let jid1 = queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap()
            .expect("connected backend always returns an id");

        // A consumer of another queue should not see it
        {
            let job = queue
                .poll_next(QueueName::Email, &[TestJob2::name()])
                .await
                .unwrap();
            assert!(job.is_none());
        }

        // Now poll_next should return this job to us
        let job1 = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(jid1, job1.id());
        assert_eq!(job1.attempt(), 1);
        assert_eq!(job1.queue(), QueueName::Messaging);
        // Second time poll should not return anything
        {
            let job = queue
                .poll_next(QueueName::Messaging, &[TestJob1::name()])
                .await
                .unwrap();
            assert!(job.is_none());
        }

        // Completed jobs should not show up in queue again
        job1.complete().await.unwrap();
        {
            let job = queue
                .poll_next(QueueName::Messaging, &[TestJob1::name()])
                .await
                .unwrap();
            assert!(job.is_none());
        }
        let details = queue
            .get_job(QueueName::Messaging, jid1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(details.state, JobState::Completed);
        assert!(details.finished_at.is_some());
    }

    #[tokio::test]
    async fn failed_jobs_come_back_after_backoff() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);

        let jid = queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap()
            .unwrap();

        let job = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.attempt(), 1);
        job.retry_later().await.unwrap();

        // Not eligible right away: the backoff pause applies.
        {
            let job = queue
                .poll_next(QueueName::Messaging, &[TestJob1::name()])
                .await
                .unwrap();
            assert!(job.is_none());
        }
        let first_run_at = queue
            .get_job(QueueName::Messaging, jid)
            .await
            .unwrap()
            .unwrap()
            .run_at;
        assert!(first_run_at > Utc::now());

        // Eligible again once the pause has passed, with the attempt counted.
        let job = queue
            .poll_next_with_instant(
                QueueName::Messaging,
                &[TestJob1::name()],
                Utc::now() + Duration::seconds(30),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.attempt(), 2);
        job.retry_later().await.unwrap();

        // Each retry pushes eligibility strictly further out.
        let second_run_at = queue
            .get_job(QueueName::Messaging, jid)
            .await
            .unwrap()
            .unwrap()
            .run_at;
        assert!(second_run_at > first_run_at);

        // The original dispatch time never moves.
        let details = queue
            .get_job(QueueName::Messaging, jid)
            .await
            .unwrap()
            .unwrap();
        assert!(details.scheduled_at < details.run_at);
    }

    #[tokio::test]
    async fn scheduling_future_jobs() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);

        // Schedule a job to run tomorrow
        let tomorrow_jid = queue
            .schedule_in::<TestJob1>(TestPayload1::default(), Duration::days(1), 0)
            .await
            .unwrap()
            .unwrap();

        // Should not be polled yet
        {
            let job = queue
                .poll_next(QueueName::Messaging, &[TestJob1::name()])
                .await
                .unwrap();
            assert!(job.is_none());
        }

        // It reports as delayed until its time comes
        let details = queue
            .get_job(QueueName::Messaging, tomorrow_jid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(details.state, JobState::Delayed);

        let hour_ago = Utc::now() - Duration::hours(1);
        let hour_ago_jid = queue
            .schedule_at::<TestJob1>(TestPayload1::default(), hour_ago, 0)
            .await
            .unwrap()
            .unwrap();

        {
            let job = queue
                .poll_next(QueueName::Messaging, &[TestJob1::name()])
                .await
                .unwrap()
                .unwrap();
            assert_eq!(hour_ago_jid, job.id());
        }

        let tomorrow = Utc::now() + Duration::days(1) + Duration::minutes(1);
        {
            let job = queue
                .poll_next_with_instant(QueueName::Messaging, &[TestJob1::name()], tomorrow)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(tomorrow_jid, job.id());
        }

        // Everything should be in-progress, so None
        {
            let job = queue
                .poll_next_with_instant(QueueName::Messaging, &[TestJob1::name()], tomorrow)
                .await
                .unwrap();
            assert!(job.is_none());
        }
    }

    #[tokio::test]
    async fn cancel_job_not_started() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);
        let jid = queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap()
            .unwrap();
        queue.cancel_job(jid).await.unwrap();

        // Should return None
        {
            let job = queue
                .poll_next(QueueName::Messaging, &[TestJob1::name()])
                .await
                .unwrap();
            assert!(job.is_none());
        }

        // Should fail
        let ret = queue.cancel_job(jid).await;
        assert!(matches!(ret, Err(QueueError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn cancel_job_started() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);
        let jid = queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap()
            .unwrap();

        let _job = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();

        let ret = queue.cancel_job(jid).await;
        assert!(matches!(ret, Err(QueueError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn ready_jobs_are_served_in_dispatch_order_then_priority_then_fifo() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);
        let hour_ago = Utc::now() - Duration::hours(1);
        let half_hour_ago = Utc::now() - Duration::minutes(30);

        // Later dispatch time, urgent priority
        let urgent_but_late = queue
            .schedule_at::<TestJob1>(TestPayload1::default(), half_hour_ago, 0)
            .await
            .unwrap()
            .unwrap();
        // Earlier dispatch time wins regardless of priority
        let early = queue
            .schedule_at::<TestJob1>(TestPayload1::default(), hour_ago, 5)
            .await
            .unwrap()
            .unwrap();

        let job = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(early, job.id());
        let job = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(urgent_but_late, job.id());
    }

    #[tokio::test]
    async fn equally_ready_jobs_respect_priority_and_submission_order() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);
        let hour_ago = Utc::now() - Duration::hours(1);

        let relaxed = queue
            .schedule_at::<TestJob1>(TestPayload1::default(), hour_ago, 3)
            .await
            .unwrap()
            .unwrap();
        let urgent = queue
            .schedule_at::<TestJob1>(TestPayload1::default(), hour_ago, 1)
            .await
            .unwrap()
            .unwrap();
        let relaxed_second = queue
            .schedule_at::<TestJob1>(TestPayload1::default(), hour_ago, 3)
            .await
            .unwrap()
            .unwrap();

        // Lower priority value first
        let job = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(urgent, job.id());
        // Then first-in first-out among equals
        let job = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(relaxed, job.id());
        let job = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(relaxed_second, job.id());
    }

    #[tokio::test]
    async fn counts_track_every_state() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);

        let _delayed = queue
            .schedule_in::<TestJob1>(TestPayload1::default(), Duration::hours(2), 0)
            .await
            .unwrap();

        // One job claimed and left running
        queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap();
        let active = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();

        // One completed
        queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap();
        let completed = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        completed.complete().await.unwrap();

        // One parked as failed
        queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap();
        let failed = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        failed.discard().await.unwrap();

        // And one still waiting its turn
        queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap();

        let counts = queue.counts(QueueName::Messaging).await.unwrap();
        assert_eq!(counts.waiting, 1);
        assert_eq!(counts.delayed, 1);
        assert_eq!(counts.active, 1);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 5);

        // Other queues are unaffected
        let email_counts = queue.counts(QueueName::Email).await.unwrap();
        assert_eq!(email_counts.total(), 0);

        active.complete().await.unwrap();
    }

    #[tokio::test]
    async fn listing_filters_by_state() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);

        let ready_jid = queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap()
            .unwrap();
        let delayed_jid = queue
            .schedule_in::<TestJob1>(TestPayload1::default(), Duration::hours(2), 0)
            .await
            .unwrap()
            .unwrap();

        let waiting = queue
            .list_jobs(QueueName::Messaging, JobState::Waiting, 50)
            .await
            .unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, ready_jid.to_string());
        assert_eq!(waiting[0].state, JobState::Waiting);
        assert_eq!(waiting[0].job_type, "test_job_1");
        // The payload rides along verbatim
        assert_eq!(waiting[0].payload["arg1"], 1774);

        let delayed = queue
            .list_jobs(QueueName::Messaging, JobState::Delayed, 50)
            .await
            .unwrap();
        assert_eq!(delayed.len(), 1);
        assert_eq!(delayed[0].id, delayed_jid.to_string());

        let limit_respected = queue
            .list_jobs(QueueName::Messaging, JobState::Waiting, 0)
            .await
            .unwrap();
        assert!(limit_respected.is_empty());

        let other_queue = queue
            .list_jobs(QueueName::Reports, JobState::Waiting, 50)
            .await
            .unwrap();
        assert!(other_queue.is_empty());
    }

    #[tokio::test]
    async fn manual_retry_requires_a_failed_job() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);

        let jid = queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap()
            .unwrap();

        // Still waiting: not retryable
        let ret = queue.retry_job(QueueName::Messaging, jid).await;
        assert!(matches!(ret, Err(QueueError::JobNotFound(_))));

        let job = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        job.discard().await.unwrap();

        queue.retry_job(QueueName::Messaging, jid).await.unwrap();
        let details = queue
            .get_job(QueueName::Messaging, jid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(details.state, JobState::Waiting);
        assert_eq!(details.attempts, 0);
        assert!(details.finished_at.is_none());

        // And the job actually runs again
        let job = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.id(), jid);
        assert_eq!(job.attempt(), 1);
    }

    #[tokio::test]
    async fn purge_removes_old_jobs_of_one_state() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);

        let completed_jid = queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap()
            .unwrap();
        let job = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        job.complete().await.unwrap();

        let _waiting_jid = queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let removed = queue
            .purge(QueueName::Messaging, JobState::Completed, Duration::zero())
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(queue
            .get_job(QueueName::Messaging, completed_jid)
            .await
            .unwrap()
            .is_none());

        // The waiting job is untouched
        let counts = queue.counts(QueueName::Messaging).await.unwrap();
        assert_eq!(counts.waiting, 1);

        // A generous grace period spares everything
        let removed = queue
            .purge(QueueName::Messaging, JobState::Waiting, Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn retention_sweep_is_age_and_count_bounded() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool.clone());

        let mut completed = Vec::new();
        for _ in 0..3 {
            let jid = queue
                .schedule::<TestJob1>(TestPayload1::default(), 0)
                .await
                .unwrap()
                .unwrap();
            let job = queue
                .poll_next(QueueName::Messaging, &[TestJob1::name()])
                .await
                .unwrap()
                .unwrap();
            job.complete().await.unwrap();
            completed.push(jid);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let failed_jid = queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap()
            .unwrap();
        let job = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        job.discard().await.unwrap();

        // Age the failed job past its window
        sqlx::query("UPDATE est_queue SET finished_at = ?1 WHERE jid = ?2")
            .bind(Utc::now() - Duration::days(8))
            .bind(failed_jid.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let policy = RetentionPolicy {
            completed_max_age: Duration::hours(24),
            completed_max_count: 2,
            failed_max_age: Duration::days(7),
        };
        let removed = queue.sweep_retention(&policy).await.unwrap();
        // Oldest completed over the count bound + the aged failed job
        assert_eq!(removed, 2);
        assert!(queue
            .get_job(QueueName::Messaging, completed[0])
            .await
            .unwrap()
            .is_none());
        assert!(queue
            .get_job(QueueName::Messaging, completed[2])
            .await
            .unwrap()
            .is_some());
        assert!(queue
            .get_job(QueueName::Messaging, failed_jid)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn stalled_jobs_are_released_for_another_attempt() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);

        let jid = queue
            .schedule::<TestJob1>(TestPayload1::default(), 0)
            .await
            .unwrap()
            .unwrap();
        let job = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.attempt(), 1);
        // The handle is dropped without completing, as if the worker died.
        drop(job);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let released = queue.release_stalled(Duration::zero()).await.unwrap();
        assert_eq!(released, 1);

        let job = queue
            .poll_next(QueueName::Messaging, &[TestJob1::name()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.id(), jid);
        // The lost run still counts as an attempt
        assert_eq!(job.attempt(), 2);
    }

    /// A reminder scheduled an hour ahead of an appointment 90 minutes out:
    /// delayed now, waiting after half an hour, completed once a worker has
    /// had it.
    #[tokio::test]
    async fn reminder_lifecycle_end_to_end() {
        let pool = make_pool().await;
        let queue = Arc::new(SqliteQueue::with_pool(pool));
        let scheduler = DelayScheduler::new(queue.clone());

        let start_time = Utc::now() + Duration::minutes(90);
        let jid = scheduler
            .schedule_before::<TestJob1>(start_time, Duration::hours(1), TestPayload1::default(), 1)
            .await
            .unwrap()
            .expect("the hour-before window is still open");

        let details = queue
            .get_job(QueueName::Messaging, jid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(details.state, JobState::Delayed);
        assert_eq!(details.scheduled_at, start_time - Duration::hours(1));

        // Half an hour early: still nothing to claim.
        {
            let job = queue
                .poll_next(QueueName::Messaging, &[TestJob1::name()])
                .await
                .unwrap();
            assert!(job.is_none());
        }

        // Just past the dispatch time the job is claimable.
        let claim_instant = Utc::now() + Duration::minutes(31);
        let job = queue
            .poll_next_with_instant(QueueName::Messaging, &[TestJob1::name()], claim_instant)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.id(), jid);
        assert_eq!(job.attempt(), 1);
        job.complete().await.unwrap();

        let details = queue
            .get_job(QueueName::Messaging, jid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(details.state, JobState::Completed);
        assert_eq!(details.attempts, 1);
    }

    struct FlakyEmailJob {
        fail_first: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl JobProcessor for FlakyEmailJob {
        type Payload = TestPayload1;
        type Error = anyhow::Error;

        async fn handle(
            &self,
            _jid: Xid,
            _payload: Self::Payload,
            _cancellation_token: CancellationToken,
        ) -> Result<(), Self::Error> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                anyhow::bail!("transient delivery failure on attempt {call}");
            }
            Ok(())
        }

        fn name() -> &'static str {
            "flaky_email"
        }

        fn queue() -> QueueName {
            QueueName::Email
        }
    }

    /// Fails twice, succeeds on the third run: ends up completed with all
    /// three attempts on the record.
    #[tokio::test]
    async fn flaky_handler_completes_within_its_attempts() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);
        let calls = Arc::new(AtomicU32::new(0));
        let router = {
            let mut r = RunnerRouter::default();
            r.add_job_handler(FlakyEmailJob {
                fail_first: 2,
                calls: calls.clone(),
            });
            r
        };

        let jid = queue
            .schedule::<FlakyEmailJob>(TestPayload1::default(), 0)
            .await
            .unwrap()
            .unwrap();

        let mut instant = Utc::now();
        for _ in 0..3 {
            // Skip past whatever backoff the previous failure imposed.
            instant = instant + Duration::seconds(60);
            let job = queue
                .poll_next_with_instant(QueueName::Email, &[FlakyEmailJob::name()], instant)
                .await
                .unwrap()
                .unwrap();
            router
                .process(job, CancellationToken::new())
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let details = queue.get_job(QueueName::Email, jid).await.unwrap().unwrap();
        assert_eq!(details.state, JobState::Completed);
        assert_eq!(details.attempts, 3);
    }

    /// Never succeeds: three attempts total, then parked as failed and not
    /// polled again.
    #[tokio::test]
    async fn hopeless_handler_is_parked_after_max_attempts() {
        let pool = make_pool().await;
        let queue = SqliteQueue::with_pool(pool);
        let calls = Arc::new(AtomicU32::new(0));
        let router = {
            let mut r = RunnerRouter::default();
            r.add_job_handler(FlakyEmailJob {
                fail_first: u32::MAX,
                calls: calls.clone(),
            });
            r
        };

        let jid = queue
            .schedule::<FlakyEmailJob>(TestPayload1::default(), 0)
            .await
            .unwrap()
            .unwrap();

        let mut instant = Utc::now();
        let mut last_run_at = None;
        for _ in 0..3 {
            instant = instant + Duration::seconds(60);
            let job = queue
                .poll_next_with_instant(QueueName::Email, &[FlakyEmailJob::name()], instant)
                .await
                .unwrap()
                .unwrap();
            router
                .process(job, CancellationToken::new())
                .await
                .unwrap();

            let details = queue.get_job(QueueName::Email, jid).await.unwrap().unwrap();
            if details.state != JobState::Failed {
                // Backoff keeps growing between attempts.
                if let Some(previous) = last_run_at {
                    assert!(details.run_at > previous);
                }
                last_run_at = Some(details.run_at);
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let details = queue.get_job(QueueName::Email, jid).await.unwrap().unwrap();
        assert_eq!(details.state, JobState::Failed);
        assert_eq!(details.attempts, 3);
        assert!(details.finished_at.is_some());

        // Parked for inspection, not for execution.
        let job = queue
            .poll_next_with_instant(
                QueueName::Email,
                &[FlakyEmailJob::name()],
                instant + Duration::days(1),
            )
            .await
            .unwrap();
        assert!(job.is_none());
    }
}
