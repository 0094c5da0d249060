//! Queue worker
//!
//! A dispatcher loop per queue takes jobs from the head and runs up to
//! `concurrency` of them at once. A retryable failure is put back at the
//! tail after the retry delay with `retry_count + 1`, until `max_retries`
//! is used up.
//!
//! Jobs for the same entity never run at the same time. A job whose entity
//! is already being synced is parked and run, in arrival order, by the task
//! holding that entity once it finishes.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use super::SyncQueue;
use crate::config::QueueConfig;
use crate::error::{RetryableError, SyncError};
use crate::models::{EntityType, SyncJobData};
use crate::otel::SyncMetrics;
use crate::sync::RetryPolicy;

/// Handles one job taken from a queue
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &SyncJobData) -> Result<(), SyncError>;
}

type EntityKey = (EntityType, String);

fn entity_key(job: &SyncJobData) -> EntityKey {
    (job.entity_type, job.entity_id.clone())
}

/// Entities with a job running, each with the jobs parked behind it
#[derive(Default)]
struct BusyEntities {
    parked: Mutex<HashMap<EntityKey, VecDeque<SyncJobData>>>,
}

impl BusyEntities {
    /// Claim the job's entity; a busy entity keeps the job parked and yields `None`
    async fn claim(&self, job: SyncJobData) -> Option<SyncJobData> {
        let mut parked = self.parked.lock().await;
        match parked.get_mut(&entity_key(&job)) {
            Some(waiting) => {
                waiting.push_back(job);
                None
            }
            None => {
                parked.insert(entity_key(&job), VecDeque::new());
                Some(job)
            }
        }
    }

    /// Next parked job for `key`, or release the entity when none is left
    async fn next_or_release(&self, key: &EntityKey) -> Option<SyncJobData> {
        let mut parked = self.parked.lock().await;
        let next = parked.get_mut(key).and_then(VecDeque::pop_front);
        if next.is_none() {
            parked.remove(key);
        }
        next
    }
}

/// Worker pool draining one [`SyncQueue`]
pub struct QueueWorker {
    queue: Arc<SyncQueue>,
    processor: Arc<dyn JobProcessor>,
    policy: RetryPolicy,
    concurrency: usize,
    metrics: Arc<SyncMetrics>,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<SyncQueue>,
        processor: Arc<dyn JobProcessor>,
        config: &QueueConfig,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            queue,
            processor,
            // The first attempt plus `max_retries` retries
            policy: RetryPolicy::new(
                config.max_retries.saturating_add(1),
                config.backoff.clone(),
            ),
            concurrency: config.concurrency.max(1),
            metrics,
        }
    }

    /// Run until shutdown is signaled or the queue is closed
    ///
    /// Jobs already running are awaited before returning.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let busy = Arc::new(BusyEntities::default());
        info!(
            queue = %self.queue.name(),
            concurrency = self.concurrency,
            "Starting queue worker"
        );

        loop {
            let permit = tokio::select! {
                _ = shutdown_rx.recv() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = tokio::select! {
                _ = shutdown_rx.recv() => break,
                job = self.queue.pop() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let Some(mut job) = busy.claim(job).await else {
                debug!(queue = %self.queue.name(), "Entity busy, job parked");
                continue;
            };

            let queue = self.queue.clone();
            let processor = self.processor.clone();
            let policy = self.policy.clone();
            let metrics = self.metrics.clone();
            let busy = busy.clone();
            tokio::spawn(async move {
                let key = entity_key(&job);
                loop {
                    handle_job(&queue, processor.as_ref(), &policy, &metrics, job).await;
                    match busy.next_or_release(&key).await {
                        Some(next) => job = next,
                        None => break,
                    }
                }
                drop(permit);
            });
        }

        // Every permit back means every spawned job has finished
        let _ = semaphore.acquire_many(self.concurrency as u32).await;
        info!(queue = %self.queue.name(), "Queue worker stopped");
    }
}

async fn handle_job(
    queue: &Arc<SyncQueue>,
    processor: &dyn JobProcessor,
    policy: &RetryPolicy,
    metrics: &SyncMetrics,
    job: SyncJobData,
) {
    let attempt = job.retry_count.saturating_add(1);
    let started = Instant::now();
    let result = processor.process(&job).await;

    match result {
        Ok(()) => {
            queue.finish(true, false);
            metrics.record_processed(queue.name());
            debug!(
                queue = %queue.name(),
                entity_type = %job.entity_type,
                entity_id = %job.entity_id,
                attempt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job completed"
            );
        }
        Err(err) if policy.should_retry(&err, attempt) => {
            queue.finish(false, true);
            metrics.record_retried(queue.name());
            let delay = policy.delay_for(&err, job.retry_count);
            warn!(
                queue = %queue.name(),
                entity_type = %job.entity_type,
                entity_id = %job.entity_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Job failed, retrying"
            );

            let queue = queue.clone();
            let retry = job.retried();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = queue.requeue(retry).await {
                    warn!(queue = %queue.name(), error = %e, "Dropping retry");
                }
            });
        }
        Err(err) => {
            queue.finish(false, false);
            metrics.record_failed(queue.name());
            error!(
                queue = %queue.name(),
                entity_type = %job.entity_type,
                entity_id = %job.entity_id,
                operation = %job.operation_type,
                attempt,
                retryable = err.is_retryable(),
                error = %err,
                "Job failed permanently"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffConfig;
    use crate::models::{EntityType, OperationType};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    fn config(concurrency: usize, max_retries: u32) -> QueueConfig {
        QueueConfig {
            concurrency,
            max_retries,
            capacity: 100,
            backoff: BackoffConfig {
                initial_backoff_ms: 10,
                max_backoff_ms: 50,
                backoff_multiplier: 2.0,
                jitter: false,
            },
        }
    }

    fn job(id: &str) -> SyncJobData {
        SyncJobData::new(EntityType::Product, id, OperationType::Update)
    }

    async fn wait_until_idle(queue: &SyncQueue, expected_done: u64) {
        for _ in 0..200 {
            let stats = queue.stats().await;
            if stats.completed + stats.failed >= expected_done && stats.in_flight == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue did not drain: {:?}", queue.stats().await);
    }

    // Test 1: Each job is processed once on success
    #[tokio::test]
    async fn test_processes_jobs() {
        let queue = Arc::new(SyncQueue::new("cms-product-sync", 100));
        let mut processor = MockJobProcessor::new();
        processor.expect_process().times(3).returning(|_| Ok(()));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = QueueWorker::new(
            queue.clone(),
            Arc::new(processor),
            &config(1, 3),
            Arc::new(SyncMetrics::global()),
        );
        let handle = tokio::spawn(worker.run(shutdown_rx));

        for id in ["1", "2", "3"] {
            queue.push(job(id)).await.unwrap();
        }
        wait_until_idle(&queue, 3).await;

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        let stats = queue.stats().await;
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.failed, 0);
    }

    // Test 2: Retryable failures retry until max_retries, then fail
    #[tokio::test]
    async fn test_retries_stop_at_max() {
        let queue = Arc::new(SyncQueue::new("q", 100));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut processor = MockJobProcessor::new();
        {
            let seen = seen.clone();
            processor.expect_process().returning(move |job| {
                seen.try_lock().unwrap().push(job.retry_count);
                Err(SyncError::ServerError(503))
            });
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = QueueWorker::new(
            queue.clone(),
            Arc::new(processor),
            &config(1, 2),
            Arc::new(SyncMetrics::global()),
        );
        let handle = tokio::spawn(worker.run(shutdown_rx));

        queue.push(job("1")).await.unwrap();
        wait_until_idle(&queue, 1).await;

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(*seen.lock().await, vec![0, 1, 2]);
        let stats = queue.stats().await;
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);
    }

    // Test 3: Non-retryable failures are not retried
    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let queue = Arc::new(SyncQueue::new("q", 100));
        let mut processor = MockJobProcessor::new();
        processor.expect_process().times(1).returning(|_| {
            Err(SyncError::Rejected {
                status: 400,
                message: "bad field".into(),
            })
        });

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = QueueWorker::new(
            queue.clone(),
            Arc::new(processor),
            &config(1, 5),
            Arc::new(SyncMetrics::global()),
        );
        let handle = tokio::spawn(worker.run(shutdown_rx));

        queue.push(job("1")).await.unwrap();
        wait_until_idle(&queue, 1).await;

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        let stats = queue.stats().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retried, 0);
    }

    // Test 4: A retry lands behind jobs enqueued before it failed
    #[tokio::test]
    async fn test_retry_goes_to_tail() {
        let queue = Arc::new(SyncQueue::new("q", 100));
        let order = Arc::new(Mutex::new(Vec::new()));
        let failed_once = Arc::new(AtomicU32::new(0));

        struct Flaky {
            order: Arc<Mutex<Vec<String>>>,
            failed_once: Arc<AtomicU32>,
        }

        #[async_trait]
        impl JobProcessor for Flaky {
            async fn process(&self, job: &SyncJobData) -> Result<(), SyncError> {
                self.order.lock().await.push(job.entity_id.clone());
                if job.entity_id == "1" && self.failed_once.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(SyncError::NetworkTimeout);
                }
                Ok(())
            }
        }

        for id in ["1", "2", "3"] {
            queue.push(job(id)).await.unwrap();
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = QueueWorker::new(
            queue.clone(),
            Arc::new(Flaky {
                order: order.clone(),
                failed_once,
            }),
            &config(1, 3),
            Arc::new(SyncMetrics::global()),
        );
        let handle = tokio::spawn(worker.run(shutdown_rx));

        wait_until_idle(&queue, 3).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(*order.lock().await, vec!["1", "2", "3", "1"]);
    }

    // Test 5: Concurrency bounds the jobs running at once
    #[tokio::test]
    async fn test_concurrency_bound() {
        struct Slow {
            running: Arc<AtomicU32>,
            peak: Arc<AtomicU32>,
        }

        #[async_trait]
        impl JobProcessor for Slow {
            async fn process(&self, _job: &SyncJobData) -> Result<(), SyncError> {
                let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                self.running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let queue = Arc::new(SyncQueue::new("q", 100));
        for i in 0..6 {
            queue.push(job(&i.to_string())).await.unwrap();
        }
        let peak = Arc::new(AtomicU32::new(0));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = QueueWorker::new(
            queue.clone(),
            Arc::new(Slow {
                running: Arc::new(AtomicU32::new(0)),
                peak: peak.clone(),
            }),
            &config(2, 0),
            Arc::new(SyncMetrics::global()),
        );
        let handle = tokio::spawn(worker.run(shutdown_rx));

        wait_until_idle(&queue, 6).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    // Test 6: Closing the queue stops the worker
    #[tokio::test]
    async fn test_stops_when_closed() {
        let queue = Arc::new(SyncQueue::new("q", 100));
        let processor = MockJobProcessor::new();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = QueueWorker::new(
            queue.clone(),
            Arc::new(processor),
            &config(1, 0),
            Arc::new(SyncMetrics::global()),
        );
        let handle = tokio::spawn(worker.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        assert!(tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .is_ok());
    }

    /// Processor acting like a store whose lookup and create are far apart
    struct SlowStore {
        docs: Arc<Mutex<Vec<String>>>,
        running: Arc<AtomicU32>,
        peak: Arc<AtomicU32>,
    }

    impl SlowStore {
        fn new() -> Self {
            Self {
                docs: Arc::new(Mutex::new(Vec::new())),
                running: Arc::new(AtomicU32::new(0)),
                peak: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl JobProcessor for SlowStore {
        async fn process(&self, job: &SyncJobData) -> Result<(), SyncError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let found = self.docs.lock().await.contains(&job.entity_id);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if !found {
                self.docs.lock().await.push(job.entity_id.clone());
            }

            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    // Test 7: Jobs for one entity run one after another, even with spare workers
    #[tokio::test]
    async fn test_same_entity_is_serialized() {
        let queue = Arc::new(SyncQueue::new("q", 100));
        queue
            .push(SyncJobData::new(EntityType::Product, "1", OperationType::Create))
            .await
            .unwrap();
        queue
            .push(SyncJobData::new(EntityType::Product, "1", OperationType::Update))
            .await
            .unwrap();

        let store = SlowStore::new();
        let docs = store.docs.clone();
        let peak = store.peak.clone();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = QueueWorker::new(
            queue.clone(),
            Arc::new(store),
            &config(2, 0),
            Arc::new(SyncMetrics::global()),
        );
        let handle = tokio::spawn(worker.run(shutdown_rx));

        wait_until_idle(&queue, 2).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(*docs.lock().await, vec!["1".to_string()]);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(queue.stats().await.completed, 2);
    }

    // Test 8: Parked jobs keep their order and other entities keep running
    #[tokio::test]
    async fn test_parked_jobs_run_in_order() {
        struct Recorder {
            order: Arc<Mutex<Vec<String>>>,
        }

        #[async_trait]
        impl JobProcessor for Recorder {
            async fn process(&self, job: &SyncJobData) -> Result<(), SyncError> {
                tokio::time::sleep(Duration::from_millis(10)).await;
                self.order
                    .lock()
                    .await
                    .push(format!("{}:{}", job.entity_id, job.operation_type));
                Ok(())
            }
        }

        let queue = Arc::new(SyncQueue::new("q", 100));
        for (id, op) in [
            ("1", OperationType::Create),
            ("1", OperationType::Update),
            ("2", OperationType::Create),
            ("1", OperationType::Delete),
        ] {
            queue
                .push(SyncJobData::new(EntityType::Product, id, op))
                .await
                .unwrap();
        }

        let order = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = QueueWorker::new(
            queue.clone(),
            Arc::new(Recorder {
                order: order.clone(),
            }),
            &config(2, 0),
            Arc::new(SyncMetrics::global()),
        );
        let handle = tokio::spawn(worker.run(shutdown_rx));

        wait_until_idle(&queue, 4).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        let order = order.lock().await.clone();
        let entity_one: Vec<_> = order.iter().filter(|o| o.starts_with("1:")).cloned().collect();
        assert_eq!(
            entity_one,
            vec![
                format!("1:{}", OperationType::Create),
                format!("1:{}", OperationType::Update),
                format!("1:{}", OperationType::Delete),
            ]
        );
        assert!(order.contains(&format!("2:{}", OperationType::Create)));
        assert_eq!(queue.stats().await.completed, 4);
    }

    // Test 9: An unbounded retry setting saturates instead of overflowing
    #[test]
    fn test_max_retries_saturates() {
        let worker = QueueWorker::new(
            Arc::new(SyncQueue::new("q", 1)),
            Arc::new(MockJobProcessor::new()),
            &config(1, u32::MAX),
            Arc::new(SyncMetrics::global()),
        );

        assert!(worker
            .policy
            .should_retry(&SyncError::ServerError(503), u32::MAX - 1));
        assert!(!worker
            .policy
            .should_retry(&SyncError::ServerError(503), u32::MAX));
    }
}
