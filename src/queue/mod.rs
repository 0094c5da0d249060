//! In-process sync job queues
//!
//! One named FIFO queue per entity kind. Jobs are taken from the head by a
//! single dispatcher per queue ([`worker::QueueWorker`]) and failed jobs are
//! re-inserted at the tail, so ordering is FIFO except for retries.

pub mod worker;

pub use worker::{JobProcessor, QueueWorker};

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::error::QueueError;
use crate::models::{EntityType, SyncJobData};

/// Point-in-time counters of one queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub name: String,
    pub pending: usize,
    pub in_flight: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
}

/// Named FIFO of sync jobs
#[derive(Debug)]
pub struct SyncQueue {
    name: String,
    capacity: usize,
    jobs: Mutex<VecDeque<SyncJobData>>,
    notify: Notify,
    closed: AtomicBool,
    in_flight: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

impl SyncQueue {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            jobs: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            in_flight: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a new job at the tail
    pub async fn push(&self, job: SyncJobData) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed(self.name.clone()));
        }

        let mut jobs = self.jobs.lock().await;
        if jobs.len() >= self.capacity {
            return Err(QueueError::Full(self.name.clone()));
        }
        debug!(
            queue = %self.name,
            entity_type = %job.entity_type,
            entity_id = %job.entity_id,
            operation = %job.operation_type,
            "Job enqueued"
        );
        jobs.push_back(job);
        drop(jobs);

        self.notify.notify_one();
        Ok(())
    }

    /// Re-insert a failed job at the tail, bypassing the capacity check
    pub async fn requeue(&self, job: SyncJobData) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed(self.name.clone()));
        }

        self.jobs.lock().await.push_back(job);
        self.retried.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
        Ok(())
    }

    /// Take the head job, waiting for one; `None` once the queue is closed
    ///
    /// Meant for a single consumer: the wake-up permit left by `push` is
    /// only guaranteed to reach one waiter.
    pub async fn pop(&self) -> Option<SyncJobData> {
        loop {
            if self.is_closed() {
                return None;
            }
            if let Some(job) = self.jobs.lock().await.pop_front() {
                self.in_flight.fetch_add(1, Ordering::Relaxed);
                return Some(job);
            }
            self.notify.notified().await;
        }
    }

    /// Take the head job without waiting
    pub async fn try_pop(&self) -> Option<SyncJobData> {
        let job = self.jobs.lock().await.pop_front();
        if job.is_some() {
            self.in_flight.fetch_add(1, Ordering::Relaxed);
        }
        job
    }

    /// Record the end of an attempt taken with `pop`
    pub(crate) fn finish(&self, succeeded: bool, will_retry: bool) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        if succeeded {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else if !will_retry {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Stop handing out jobs; pending jobs are discarded
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    pub async fn stats(&self) -> QueueStats {
        QueueStats {
            name: self.name.clone(),
            pending: self.len().await,
            in_flight: self.in_flight.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

/// Registry of the per-kind queues
#[derive(Debug, Default)]
pub struct SyncQueues {
    queues: BTreeMap<String, Arc<SyncQueue>>,
}

impl SyncQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue for every entity kind
    pub fn for_all_kinds(capacity: usize) -> Self {
        let mut queues = Self::new();
        for entity_type in EntityType::ALL {
            queues.register(Arc::new(SyncQueue::new(entity_type.queue_name(), capacity)));
        }
        queues
    }

    pub fn register(&mut self, queue: Arc<SyncQueue>) {
        self.queues.insert(queue.name().to_string(), queue);
    }

    pub fn get(&self, name: &str) -> Option<Arc<SyncQueue>> {
        self.queues.get(name).cloned()
    }

    pub fn for_kind(&self, entity_type: EntityType) -> Option<Arc<SyncQueue>> {
        self.get(entity_type.queue_name())
    }

    /// Enqueue on the queue matching the job's entity kind
    pub async fn enqueue(&self, job: SyncJobData) -> Result<(), QueueError> {
        let queue_name = job.entity_type.queue_name();
        let queue = self
            .get(queue_name)
            .ok_or_else(|| QueueError::UnknownQueue(queue_name.to_string()))?;
        queue.push(job).await
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SyncQueue>> {
        self.queues.values()
    }

    pub async fn stats(&self) -> Vec<QueueStats> {
        let mut stats = Vec::with_capacity(self.queues.len());
        for queue in self.queues.values() {
            stats.push(queue.stats().await);
        }
        stats
    }

    pub fn close_all(&self) {
        for queue in self.queues.values() {
            queue.close();
        }
    }
}
