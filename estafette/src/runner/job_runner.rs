use super::job_router::RunnerRouter;
use crate::core::job::QueueName;
use crate::core::queue::{Queue, QueueError};
use crate::core::CancellationToken;
use anyhow::Context;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const JITTER_INTERVAL_MS: [i64; 10] = [0, 1, 1, 2, 3, 5, 8, 13, 21, 34];

/// How many consumers each queue gets.
///
/// Delivery channels differ in how heavy one job is, so the default can be
/// overridden per queue.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    default_concurrency: usize,
    overrides: HashMap<QueueName, usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            default_concurrency: 5,
            overrides: HashMap::new(),
        }
    }
}

impl WorkerConfig {
    pub fn new(default_concurrency: usize) -> Self {
        Self {
            default_concurrency,
            overrides: HashMap::new(),
        }
    }

    pub fn with_concurrency(mut self, queue: QueueName, concurrency: usize) -> Self {
        self.overrides.insert(queue, concurrency.max(1));
        self
    }

    pub fn concurrency_for(&self, queue: QueueName) -> usize {
        self.overrides
            .get(&queue)
            .copied()
            .unwrap_or(self.default_concurrency)
            .max(1)
    }
}

/// A bridge between job processors and the queue.
///
/// ## Implementation
///
/// This runner is implemented very naively:
///
/// - For every queue the router serves, it creates a semaphore with permits count equal to that
///   queue's desired concurrency
/// - Then, in a loop, for every available permit:
///     - Poll the queue with given interval + random jitter
///     - Process incoming job
///     - Give back the permit
///
/// Future implementation might work differently, but public interface should stay the same.
///
/// A handler that fails only ever affects its own job; queue-level failures suspend the polling
/// consumer briefly and it resumes once the store answers again.
pub struct JobRunner<Q>
where
    Q: Queue,
{
    queue: Arc<Q>,
    processor: Arc<RunnerRouter>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl<Q> JobRunner<Q>
where
    Q: Queue + 'static,
{
    /// Create a new JobRunner with desired per-queue concurrency from queue and router.
    pub fn new(queue: Arc<Q>, processor: RunnerRouter, config: WorkerConfig) -> Self {
        Self {
            queue,
            processor: Arc::new(processor),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops every consumer when cancelled. Handlers receive a
    /// child of it and should wind down co-operatively.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

impl<Q> JobRunner<Q>
where
    Q: Queue + 'static,
{
    /// Runs until the shutdown token is cancelled.
    pub async fn run(&self, interval: chrono::Duration) -> Result<(), QueueError> {
        let mut queue_loops = Vec::new();
        for queue_name in self.processor.queues() {
            let concurrency = self.config.concurrency_for(queue_name);
            let semaphore = Arc::new(Semaphore::new(concurrency));
            let queue = self.queue.clone();
            let processor = self.processor.clone();
            let shutdown = self.shutdown.clone();
            tracing::info!(queue = %queue_name, concurrency, "starting queue consumers");
            queue_loops.push(tokio::spawn(async move {
                loop {
                    let permit = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        permit = semaphore.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };
                    let queue = queue.clone();
                    let processor = processor.clone();
                    let consumer_shutdown = shutdown.clone();
                    let interval = interval + get_random_jitter();
                    tokio::spawn(async move {
                        let _permit = permit;
                        processor
                            .listen(queue_name, queue, interval, consumer_shutdown)
                            .await;
                    });
                }
            }));
        }
        for queue_loop in queue_loops {
            queue_loop
                .await
                .context("Queue consumer loop panicked")
                .map_err(QueueError::Other)?;
        }
        Ok(())
    }
}

fn get_random_jitter() -> chrono::Duration {
    JITTER_INTERVAL_MS
        .choose(&mut rand::thread_rng())
        .map(|ms| chrono::Duration::milliseconds(*ms))
        .unwrap_or_else(|| chrono::Duration::milliseconds(5))
}
