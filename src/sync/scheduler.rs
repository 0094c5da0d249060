//! Reconcile scheduler
//!
//! Periodically reconciles each entity kind, with an optional startup run,
//! an initial delay and random jitter so the kinds do not all hit the CMS
//! at once. A [`ReconcileHandle`] triggers an immediate run for one kind and
//! waits for its summary.
//!
//! Runs of one kind never overlap: a manual trigger arriving while that kind
//! is being reconciled waits for the running pass, then starts its own.

use crate::error::SyncError;
use crate::config::SchedulerConfig;
use crate::models::EntityType;
use crate::reconciler::{BulkReconciler, ReconcileSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

/// Anything that can reconcile one entity kind
#[async_trait]
pub trait Reconcile: Send + Sync {
    async fn reconcile(&self, entity_type: EntityType) -> Result<ReconcileSummary, SyncError>;
}

#[async_trait]
impl Reconcile for BulkReconciler {
    async fn reconcile(&self, entity_type: EntityType) -> Result<ReconcileSummary, SyncError> {
        BulkReconciler::reconcile(self, entity_type).await
    }
}

/// Last known state of one kind's reconciliation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_summary: Option<ReconcileSummary>,
    pub last_error: Option<String>,
    pub next_run: Option<DateTime<Utc>>,
    pub in_progress: bool,
}

type StatusMap = Arc<RwLock<BTreeMap<EntityType, ReconcileStatus>>>;

/// One gate per kind, held for the whole of a reconciliation
type KindGates = Arc<BTreeMap<EntityType, Arc<Mutex<()>>>>;

struct ManualRequest {
    entity_type: EntityType,
    response: oneshot::Sender<Result<ReconcileSummary, SyncError>>,
}

pub struct ReconcileScheduler {
    config: SchedulerConfig,
    reconciler: Arc<dyn Reconcile>,
    kinds: Vec<EntityType>,
    status: StatusMap,
    gates: KindGates,
    shutdown_rx: broadcast::Receiver<()>,
    manual_rx: mpsc::Receiver<ManualRequest>,
    manual_tx: mpsc::Sender<ManualRequest>,
}

impl ReconcileScheduler {
    pub fn new(
        config: SchedulerConfig,
        reconciler: Arc<dyn Reconcile>,
        kinds: Vec<EntityType>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (manual_tx, manual_rx) = mpsc::channel(32);
        let status = kinds
            .iter()
            .map(|k| (*k, ReconcileStatus::default()))
            .collect();
        let gates = kinds
            .iter()
            .map(|k| (*k, Arc::new(Mutex::new(()))))
            .collect();

        Self {
            config,
            reconciler,
            kinds,
            status: Arc::new(RwLock::new(status)),
            gates: Arc::new(gates),
            shutdown_rx,
            manual_rx,
            manual_tx,
        }
    }

    pub fn handle(&self) -> ReconcileHandle {
        ReconcileHandle {
            tx: self.manual_tx.clone(),
            status: self.status.clone(),
        }
    }

    /// Run until shutdown; periodic tasks are only started when enabled
    pub async fn run(mut self) {
        info!(
            kinds = self.kinds.len(),
            enabled = self.config.enabled,
            interval_secs = self.config.interval_secs,
            "Starting reconcile scheduler"
        );

        let mut handles = Vec::new();
        let (task_shutdown_tx, _) = broadcast::channel::<()>(1);

        if self.config.enabled {
            for kind in &self.kinds {
                let kind = *kind;
                let runner = self.runner();
                let task_shutdown_rx = task_shutdown_tx.subscribe();

                handles.push(tokio::spawn(async move {
                    runner.run_periodic(kind, task_shutdown_rx).await;
                }));
            }
        }

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping reconcile scheduler");
                    let _ = task_shutdown_tx.send(());
                    break;
                }
                Some(request) = self.manual_rx.recv() => {
                    self.handle_manual(request);
                }
            }
        }

        for handle in handles {
            let _ = handle.await;
        }

        info!("Reconcile scheduler stopped");
    }

    fn runner(&self) -> Runner {
        Runner {
            reconciler: self.reconciler.clone(),
            status: self.status.clone(),
            gates: self.gates.clone(),
            config: self.config.clone(),
        }
    }

    fn handle_manual(&self, request: ManualRequest) {
        if !self.kinds.contains(&request.entity_type) {
            warn!(
                entity_type = %request.entity_type,
                "Manual reconciliation requested for unscheduled kind"
            );
            let _ = request.response.send(Err(SyncError::NotFound));
            return;
        }

        info!(entity_type = %request.entity_type, "Manual reconciliation triggered");
        let runner = self.runner();
        tokio::spawn(async move {
            let result = runner.perform(request.entity_type).await;
            let _ = request.response.send(result);
        });
    }
}

/// What a reconciliation needs, shared by the periodic tasks and manual runs
#[derive(Clone)]
struct Runner {
    reconciler: Arc<dyn Reconcile>,
    status: StatusMap,
    gates: KindGates,
    config: SchedulerConfig,
}

fn random_jitter(config: &SchedulerConfig) -> Duration {
    if config.jitter_secs > 0 {
        Duration::from_secs(rand::thread_rng().gen_range(0..config.jitter_secs))
    } else {
        Duration::ZERO
    }
}

impl Runner {
    async fn run_periodic(&self, kind: EntityType, mut shutdown_rx: broadcast::Receiver<()>) {
        let config = &self.config;
        let interval = Duration::from_secs(config.interval_secs.max(1));

        if config.run_on_startup {
            let delay = Duration::from_secs(config.initial_delay_secs);
            tokio::select! {
                _ = shutdown_rx.recv() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            info!(entity_type = %kind, "Performing startup reconciliation");
            let _ = self.perform(kind).await;
        }

        let jitter = random_jitter(config);
        let mut timer = interval_at(Instant::now() + interval + jitter, interval);
        self.set_next_run(kind, interval + jitter).await;
        debug!(
            entity_type = %kind,
            interval_secs = interval.as_secs(),
            jitter_secs = jitter.as_secs(),
            "Scheduled next reconciliation"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!(entity_type = %kind, "Reconcile task shutting down");
                    break;
                }
                _ = timer.tick() => {
                    let jitter = random_jitter(config);
                    if !jitter.is_zero() {
                        tokio::time::sleep(jitter).await;
                    }

                    info!(entity_type = %kind, "Performing scheduled reconciliation");
                    let _ = self.perform(kind).await;
                    self.set_next_run(kind, interval).await;
                }
            }
        }
    }

    async fn set_next_run(&self, kind: EntityType, after: Duration) {
        if let Some(s) = self.status.write().await.get_mut(&kind) {
            s.next_run = chrono::Duration::from_std(after)
                .ok()
                .map(|after| Utc::now() + after);
        }
    }

    async fn perform(&self, kind: EntityType) -> Result<ReconcileSummary, SyncError> {
        let _running = match self.gates.get(&kind) {
            Some(gate) => gate.lock().await,
            None => return Err(SyncError::NotFound),
        };

        if let Some(s) = self.status.write().await.get_mut(&kind) {
            s.in_progress = true;
        }

        let config = &self.config;
        let result = tokio::time::timeout(
            Duration::from_secs(config.timeout_secs),
            self.reconciler.reconcile(kind),
        )
        .await;

        let result = match result {
            Ok(Ok(summary)) => {
                info!(
                    entity_type = %kind,
                    total = summary.total,
                    error_count = summary.error_count,
                    "Reconciliation completed"
                );
                Ok(summary)
            }
            Ok(Err(err)) => {
                warn!(entity_type = %kind, error = %err, "Reconciliation failed");
                Err(err)
            }
            Err(_) => {
                error!(
                    entity_type = %kind,
                    timeout_secs = config.timeout_secs,
                    "Reconciliation timed out"
                );
                Err(SyncError::NetworkTimeout)
            }
        };

        if let Some(s) = self.status.write().await.get_mut(&kind) {
            s.in_progress = false;
            s.last_run = Some(Utc::now());
            match &result {
                Ok(summary) => {
                    s.last_summary = Some(summary.clone());
                    s.last_error = None;
                }
                Err(err) => s.last_error = Some(err.to_string()),
            }
        }

        result
    }
}

/// Handle for triggering reconciliations and reading their status
#[derive(Clone)]
pub struct ReconcileHandle {
    tx: mpsc::Sender<ManualRequest>,
    status: StatusMap,
}

impl ReconcileHandle {
    /// Reconcile one kind now and wait for the summary
    pub async fn trigger(&self, entity_type: EntityType) -> Result<ReconcileSummary, SyncError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(ManualRequest {
                entity_type,
                response: response_tx,
            })
            .await
            .map_err(|_| SyncError::Network("Scheduler not running".to_string()))?;

        response_rx
            .await
            .map_err(|_| SyncError::Network("No response from scheduler".to_string()))?
    }

    pub async fn status(&self) -> BTreeMap<EntityType, ReconcileStatus> {
        self.status.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::timeout;

    /// Reconciler counting runs per call and returning a fixed result
    struct CountingReconciler {
        runs: Arc<AtomicU32>,
        delay: Duration,
        fail: bool,
    }

    impl CountingReconciler {
        fn new() -> Self {
            Self {
                runs: Arc::new(AtomicU32::new(0)),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn runs(&self) -> Arc<AtomicU32> {
            self.runs.clone()
        }
    }

    #[async_trait]
    impl Reconcile for CountingReconciler {
        async fn reconcile(&self, entity_type: EntityType) -> Result<ReconcileSummary, SyncError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(SyncError::ServerError(500));
            }
            Ok(ReconcileSummary {
                entity_type,
                total: 4,
                success_count: 4,
                error_count: 0,
                duration_ms: 1,
                failures: vec![],
            })
        }
    }

    fn config(enabled: bool, run_on_startup: bool) -> SchedulerConfig {
        SchedulerConfig {
            enabled,
            interval_secs: 100,
            run_on_startup,
            initial_delay_secs: 0,
            jitter_secs: 0,
            timeout_secs: 10,
        }
    }

    // Test 1: Startup run reconciles every kind once
    #[tokio::test]
    async fn test_startup_run() {
        let reconciler = CountingReconciler::new();
        let runs = reconciler.runs();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let scheduler = ReconcileScheduler::new(
            config(true, true),
            Arc::new(reconciler),
            EntityType::ALL.to_vec(),
            shutdown_rx,
        );
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();
        let _ = timeout(Duration::from_secs(1), handle).await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    // Test 2: Periodic runs follow the interval
    #[tokio::test(start_paused = true)]
    async fn test_interval() {
        let reconciler = CountingReconciler::new();
        let runs = reconciler.runs();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let scheduler = ReconcileScheduler::new(
            config(true, false),
            Arc::new(reconciler),
            vec![EntityType::Product],
            shutdown_rx,
        );
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(51)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }

    // Test 3: Disabled scheduler only serves manual triggers
    #[tokio::test]
    async fn test_manual_trigger_when_disabled() {
        let reconciler = CountingReconciler::new();
        let runs = reconciler.runs();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let scheduler = ReconcileScheduler::new(
            config(false, true),
            Arc::new(reconciler),
            EntityType::ALL.to_vec(),
            shutdown_rx,
        );
        let manual = scheduler.handle();
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let summary = manual.trigger(EntityType::Collection).await.unwrap();
        assert_eq!(summary.entity_type, EntityType::Collection);
        assert_eq!(summary.total, 4);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let status = manual.status().await;
        let collection = &status[&EntityType::Collection];
        assert!(collection.last_run.is_some());
        assert!(!collection.in_progress);
        assert_eq!(collection.last_summary.as_ref().map(|s| s.total), Some(4));

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }

    // Test 4: Unscheduled kinds yield NotFound
    #[tokio::test]
    async fn test_manual_unknown_kind() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let scheduler = ReconcileScheduler::new(
            config(false, false),
            Arc::new(CountingReconciler::new()),
            vec![EntityType::Product],
            shutdown_rx,
        );
        let manual = scheduler.handle();
        let handle = tokio::spawn(scheduler.run());

        let result = manual.trigger(EntityType::ProductVariant).await;
        assert_eq!(result, Err(SyncError::NotFound));

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }

    // Test 5: Timeouts are reported as errors in the status
    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let mut reconciler = CountingReconciler::new();
        reconciler.delay = Duration::from_secs(30);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let scheduler = ReconcileScheduler::new(
            config(false, false),
            Arc::new(reconciler),
            vec![EntityType::Product],
            shutdown_rx,
        );
        let manual = scheduler.handle();
        let handle = tokio::spawn(scheduler.run());

        let result = manual.trigger(EntityType::Product).await;
        assert_eq!(result, Err(SyncError::NetworkTimeout));

        let status = manual.status().await;
        assert_eq!(
            status[&EntityType::Product].last_error.as_deref(),
            Some("Network timeout")
        );

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }

    // Test 6: Reconciler errors pass through to the caller
    #[tokio::test]
    async fn test_manual_error() {
        let mut reconciler = CountingReconciler::new();
        reconciler.fail = true;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let scheduler = ReconcileScheduler::new(
            config(false, false),
            Arc::new(reconciler),
            vec![EntityType::Product],
            shutdown_rx,
        );
        let manual = scheduler.handle();
        let handle = tokio::spawn(scheduler.run());

        assert_eq!(
            manual.trigger(EntityType::Product).await,
            Err(SyncError::ServerError(500))
        );

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }

    // Test 7: Graceful shutdown stops the scheduler and its tasks
    #[tokio::test]
    async fn test_graceful_shutdown() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let scheduler = ReconcileScheduler::new(
            config(true, false),
            Arc::new(CountingReconciler::new()),
            EntityType::ALL.to_vec(),
            shutdown_rx,
        );
        let manual = scheduler.handle();
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(()).unwrap();

        assert!(timeout(Duration::from_secs(2), handle).await.is_ok());
        assert!(manual.trigger(EntityType::Product).await.is_err());
    }

    /// Reconciler recording how many runs of a kind overlap
    struct OverlapReconciler {
        running: AtomicU32,
        peak: Arc<AtomicU32>,
        runs: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Reconcile for OverlapReconciler {
        async fn reconcile(&self, entity_type: EntityType) -> Result<ReconcileSummary, SyncError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(ReconcileSummary {
                entity_type,
                total: 1,
                success_count: 1,
                error_count: 0,
                duration_ms: 100,
                failures: vec![],
            })
        }
    }

    // Test 8: Concurrent triggers for one kind run one after another
    #[tokio::test(start_paused = true)]
    async fn test_manual_triggers_do_not_overlap() {
        let peak = Arc::new(AtomicU32::new(0));
        let runs = Arc::new(AtomicU32::new(0));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let scheduler = ReconcileScheduler::new(
            config(false, false),
            Arc::new(OverlapReconciler {
                running: AtomicU32::new(0),
                peak: peak.clone(),
                runs: runs.clone(),
            }),
            vec![EntityType::Product, EntityType::Collection],
            shutdown_rx,
        );
        let manual = scheduler.handle();
        let handle = tokio::spawn(scheduler.run());

        let (first, second) = tokio::join!(
            manual.trigger(EntityType::Product),
            manual.trigger(EntityType::Product)
        );
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(!manual.status().await[&EntityType::Product].in_progress);

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }

    // Test 9: A manual trigger waits for the periodic run of the same kind
    #[tokio::test(start_paused = true)]
    async fn test_manual_waits_for_periodic_run() {
        let peak = Arc::new(AtomicU32::new(0));
        let runs = Arc::new(AtomicU32::new(0));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let scheduler = ReconcileScheduler::new(
            config(true, true),
            Arc::new(OverlapReconciler {
                running: AtomicU32::new(0),
                peak: peak.clone(),
                runs: runs.clone(),
            }),
            vec![EntityType::Product],
            shutdown_rx,
        );
        let manual = scheduler.handle();
        let handle = tokio::spawn(scheduler.run());

        // Let the startup run begin before triggering
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(manual.status().await[&EntityType::Product].in_progress);

        manual.trigger(EntityType::Product).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(peak.load(Ordering::SeqCst), 1);

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }
}
