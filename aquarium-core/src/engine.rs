//! Monitoring engine: polls the container list, diffs it against the held
//! table, refreshes per-container metrics under individual time budgets and
//! publishes change events.
//!
//! # Cycle
//!
//! 1. List refresh (5 s budget). A membership or order change rebuilds the
//!    table and emits `ListChanged` before anything else happens.
//! 2. Metrics refresh, dispatched to a background task. Running containers
//!    are fetched one after another, each under its own 1 s budget. Only one
//!    refresh task runs at a time; a cycle that finds the slot taken skips.
//! 3. Sleep for the poll interval, then start over.
//!
//! Data-collection failures never reach callers: they are logged and the
//! affected data simply stays as it was.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::{EventBus, MonitorEvent};
use crate::health::{HealthEvaluator, ThresholdEvaluator};
use crate::models::{ContainerInfo, ContainerMetrics, ContainerRecord, HealthStatus};
use crate::source::{MetricsSource, SourceError};
use crate::state::{new_state, ItemTable, Shared};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const LIST_TIMEOUT: Duration = Duration::from_secs(5);
pub const METRICS_TIMEOUT: Duration = Duration::from_secs(1);

/// What to do with the held table when listing containers fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListFailurePolicy {
    /// Treat the failure as "no containers": the table is emptied and a
    /// `ListChanged` with an empty list is emitted.
    #[default]
    TreatAsEmpty,
    /// Keep the last known list; metrics refresh still runs against it.
    KeepLast,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub list_timeout: Duration,
    pub metrics_timeout: Duration,
    pub list_failure_policy: ListFailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            list_timeout: LIST_TIMEOUT,
            metrics_timeout: METRICS_TIMEOUT,
            list_failure_policy: ListFailurePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    pub fn with_metrics_timeout(mut self, timeout: Duration) -> Self {
        self.metrics_timeout = timeout;
        self
    }

    pub fn with_list_failure_policy(mut self, policy: ListFailurePolicy) -> Self {
        self.list_failure_policy = policy;
        self
    }
}

/// Defects that terminate the monitoring loop.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("container id listed twice: {0}")]
    DuplicateIdentity(String),
}

struct RunHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct MonitoringEngine {
    source: Arc<dyn MetricsSource>,
    evaluator: Arc<dyn HealthEvaluator>,
    config: EngineConfig,
    table: Shared<ItemTable>,
    events: Arc<EventBus>,
    emit_lock: Arc<Mutex<()>>,
    refresh_slot: Arc<Semaphore>,
    run: Mutex<Option<RunHandle>>,
}

impl MonitoringEngine {
    pub fn new(source: Arc<dyn MetricsSource>, config: EngineConfig) -> Self {
        Self {
            source,
            evaluator: Arc::new(ThresholdEvaluator),
            config,
            table: new_state(ItemTable::new()),
            events: Arc::new(EventBus::new()),
            emit_lock: Arc::new(Mutex::new(())),
            refresh_slot: Arc::new(Semaphore::new(1)),
            run: Mutex::new(None),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn HealthEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Start the polling loop.
    ///
    /// The loop stops when `cancel` fires or [`stop`](Self::stop) is called.
    /// Returns false, without starting anything, while a previous loop is
    /// still active.
    pub fn start(&self, poll_interval: Duration, cancel: &CancellationToken) -> bool {
        let mut run = self.run.lock();
        if let Some(handle) = run.as_ref() {
            if !handle.task.is_finished() {
                warn!("Monitoring is already running");
                return false;
            }
        }

        let token = cancel.child_token();
        let task = tokio::spawn(self.poller().run(poll_interval, token.clone()));
        *run = Some(RunHandle { token, task });

        info!(
            interval_ms = poll_interval.as_millis() as u64,
            "Container monitoring started"
        );
        true
    }

    /// Cancel the loop and wait for it to finish. No-op when not running.
    pub async fn stop(&self) {
        let handle = self.run.lock().take();
        let Some(handle) = handle else {
            return;
        };

        handle.token.cancel();
        match handle.task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => error!(error = %e, "Monitoring loop panicked"),
        }

        info!("Container monitoring stopped");
    }

    /// True while a polling loop is active.
    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Copy of the tracked containers, in table order.
    pub fn current_items(&self) -> Vec<ContainerInfo> {
        self.table.lock().snapshot()
    }

    fn poller(&self) -> Poller {
        Poller {
            source: Arc::clone(&self.source),
            evaluator: Arc::clone(&self.evaluator),
            config: self.config.clone(),
            table: Arc::clone(&self.table),
            events: Arc::clone(&self.events),
            emit_lock: Arc::clone(&self.emit_lock),
            refresh_slot: Arc::clone(&self.refresh_slot),
        }
    }
}

impl Drop for MonitoringEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.run.get_mut().take() {
            handle.token.cancel();
        }
    }
}

impl std::fmt::Debug for MonitoringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringEngine")
            .field("config", &self.config)
            .field("items", &self.table.lock().len())
            .field("running", &self.is_running())
            .finish()
    }
}

enum ListOutcome {
    Fresh(Vec<ContainerRecord>),
    Failed,
    Cancelled,
}

enum FetchFailure {
    TimedOut,
    Source(SourceError),
}

/// Everything one loop (and its refresh tasks) needs, detached from the engine.
#[derive(Clone)]
struct Poller {
    source: Arc<dyn MetricsSource>,
    evaluator: Arc<dyn HealthEvaluator>,
    config: EngineConfig,
    table: Shared<ItemTable>,
    events: Arc<EventBus>,
    emit_lock: Arc<Mutex<()>>,
    refresh_slot: Arc<Semaphore>,
}

impl Poller {
    async fn run(self, poll_interval: Duration, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                break;
            }

            if let Err(e) = self.poll_cycle(&token).await {
                error!(error = %e, "Error in monitoring loop, loop terminated");
                return;
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!("Monitoring loop cancelled");
    }

    async fn poll_cycle(&self, token: &CancellationToken) -> Result<(), EngineError> {
        let records = match self.fetch_list(token).await {
            ListOutcome::Fresh(records) => Some(records),
            ListOutcome::Cancelled => return Ok(()),
            ListOutcome::Failed => match self.config.list_failure_policy {
                ListFailurePolicy::KeepLast => None,
                ListFailurePolicy::TreatAsEmpty => Some(Vec::new()),
            },
        };

        if let Some(records) = records {
            self.apply_list(records)?;
        }

        self.spawn_metrics_refresh(token);
        Ok(())
    }

    async fn fetch_list(&self, token: &CancellationToken) -> ListOutcome {
        let call_token = token.child_token();
        let _guard = call_token.clone().drop_guard();

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return ListOutcome::Cancelled,
            result = tokio::time::timeout(self.config.list_timeout, self.source.list_items(&call_token)) => result,
        };

        match result {
            Ok(Ok(records)) => {
                debug!(count = records.len(), "Retrieved containers");
                ListOutcome::Fresh(records)
            }
            Ok(Err(SourceError::Cancelled)) if token.is_cancelled() => ListOutcome::Cancelled,
            Ok(Err(e)) => {
                warn!(error = %e, "Error retrieving containers");
                ListOutcome::Failed
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.list_timeout.as_millis() as u64,
                    "Timeout retrieving containers"
                );
                ListOutcome::Failed
            }
        }
    }

    /// Diff `records` against the table. Emits `ListChanged` when the ids or
    /// their order differ; otherwise refreshes the held items in place.
    fn apply_list(&self, records: Vec<ContainerRecord>) -> Result<(), EngineError> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.id.as_str()) {
                return Err(EngineError::DuplicateIdentity(record.id.clone()));
            }
        }

        let _emit = self.emit_lock.lock();
        let changed = {
            let mut table = self.table.lock();
            if table.same_membership(&records) {
                for (item, record) in table.iter_mut().zip(records) {
                    item.name = record.name;
                    item.image = record.image;
                    if item.state != record.state {
                        debug!(
                            container_id = %item.id,
                            from = %item.state,
                            to = %record.state,
                            "Container state changed"
                        );
                        item.state = record.state;
                        item.health = self.evaluator.evaluate(item);
                    }
                }
                None
            } else {
                table.replace(records.into_iter().map(ContainerInfo::from_record).collect());
                for item in table.iter_mut() {
                    item.health = self.evaluator.evaluate(item);
                }
                Some(table.snapshot())
            }
        };

        if let Some(items) = changed {
            info!(count = items.len(), "Container list changed");
            self.events.publish(&MonitorEvent::ListChanged { items });
        }
        Ok(())
    }

    fn spawn_metrics_refresh(&self, token: &CancellationToken) {
        let permit = match Arc::clone(&self.refresh_slot).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!("Previous metrics refresh still running, skipping this cycle");
                return;
            }
        };

        let poller = self.clone();
        let token = token.clone();
        tokio::spawn(async move {
            poller.refresh_metrics(&token).await;
            drop(permit);
        });
    }

    async fn refresh_metrics(&self, token: &CancellationToken) {
        let started = Instant::now();
        let running = self.table.lock().running_ids();

        for container_id in &running {
            if token.is_cancelled() {
                return;
            }

            match self.fetch_metrics(container_id, token).await {
                Ok(Some(metrics)) => self.apply_metrics(container_id, metrics),
                Ok(None) => debug!(container_id = %container_id, "No metrics available"),
                Err(FetchFailure::TimedOut) => {
                    debug!(container_id = %container_id, "Metrics retrieval timeout")
                }
                Err(FetchFailure::Source(e)) => {
                    warn!(container_id = %container_id, error = %e, "Error updating metrics")
                }
            }
        }

        {
            let mut table = self.table.lock();
            for item in table.iter_mut().filter(|item| !item.is_running()) {
                item.health = HealthStatus::Stopped;
            }
        }

        debug!(
            containers = running.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Metrics refresh complete"
        );
    }

    async fn fetch_metrics(
        &self,
        container_id: &str,
        token: &CancellationToken,
    ) -> Result<Option<ContainerMetrics>, FetchFailure> {
        let call_token = token.child_token();
        let _guard = call_token.clone().drop_guard();

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(FetchFailure::TimedOut),
            result = tokio::time::timeout(
                self.config.metrics_timeout,
                self.source.get_metrics(container_id, &call_token),
            ) => result,
        };

        match result {
            Ok(Ok(metrics)) => Ok(metrics),
            Ok(Err(SourceError::Cancelled)) | Err(_) => Err(FetchFailure::TimedOut),
            Ok(Err(e)) => Err(FetchFailure::Source(e)),
        }
    }

    fn apply_metrics(&self, container_id: &str, metrics: ContainerMetrics) {
        let _emit = self.emit_lock.lock();
        let health = {
            let mut table = self.table.lock();
            table.get_mut(container_id).map(|item| {
                item.metrics = Some(metrics.clone());
                item.health = self.evaluator.evaluate(item);
                item.health
            })
        };

        match health {
            Some(health) => {
                debug!(
                    container_id = %container_id,
                    cpu = metrics.cpu_percentage,
                    memory_pct = metrics.memory_percentage(),
                    health = %health,
                    "Metrics updated"
                );
                self.events.publish(&MonitorEvent::MetricsUpdated {
                    container_id: container_id.to_string(),
                    metrics,
                });
            }
            None => debug!(
                container_id = %container_id,
                "Container left the table before its metrics arrived"
            ),
        }
    }
}
