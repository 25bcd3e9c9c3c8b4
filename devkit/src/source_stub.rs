/*!
Scriptable metrics source for developing against the engine without Docker.

Each list poll consumes the next scripted `ListStep`; the last step repeats
forever. Metrics work the same way per container id. Every call is recorded
so tests can assert on what the engine asked for, and the number of metrics
fetches running at once is tracked so tests can check they never overlap.
*/

use aquarium_core::{
    CancellationToken, ContainerMetrics, ContainerRecord, MetricsSource, SourceError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum ListStep {
    Items(Vec<ContainerRecord>),
    Fail,
    /// Never answers; only cancellation or the engine's budget ends the call.
    Hang,
}

#[derive(Debug, Clone)]
pub enum MetricsStep {
    Ready(ContainerMetrics),
    Delayed(Duration, ContainerMetrics),
    Absent,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    List,
    Metrics(String),
}

#[derive(Default)]
pub struct ScriptedSource {
    lists: Mutex<VecDeque<ListStep>>,
    metrics: Mutex<HashMap<String, VecDeque<MetricsStep>>>,
    calls: Mutex<Vec<SourceCall>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Counts one running metrics fetch; released even when the engine drops
/// the call on timeout.
struct InFlight<'a> {
    count: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(count: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = count.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { count }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the list returned by the next poll.
    pub fn push_list(&self, records: Vec<ContainerRecord>) -> &Self {
        self.lists.lock().push_back(ListStep::Items(records));
        self
    }

    pub fn push_list_step(&self, step: ListStep) -> &Self {
        self.lists.lock().push_back(step);
        self
    }

    /// Queue the next metrics answer for one container.
    pub fn push_metrics(&self, container_id: &str, step: MetricsStep) -> &Self {
        self.metrics
            .lock()
            .entry(container_id.to_string())
            .or_default()
            .push_back(step);
        self
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| **call == SourceCall::List)
            .count()
    }

    pub fn metrics_calls(&self, container_id: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, SourceCall::Metrics(id) if id == container_id))
            .count()
    }

    /// Metrics fetches running right now.
    pub fn metrics_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most metrics fetches ever observed running at the same time.
    pub fn peak_metrics_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_list_step(&self) -> ListStep {
        let mut lists = self.lists.lock();
        match lists.len() {
            0 => ListStep::Items(Vec::new()),
            1 => lists[0].clone(),
            _ => lists.pop_front().unwrap_or(ListStep::Items(Vec::new())),
        }
    }

    fn next_metrics_step(&self, container_id: &str) -> MetricsStep {
        let mut metrics = self.metrics.lock();
        match metrics.get_mut(container_id) {
            None => MetricsStep::Absent,
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(MetricsStep::Absent),
            Some(queue) => queue.front().cloned().unwrap_or(MetricsStep::Absent),
        }
    }
}

#[async_trait]
impl MetricsSource for ScriptedSource {
    async fn list_items(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContainerRecord>, SourceError> {
        self.calls.lock().push(SourceCall::List);

        match self.next_list_step() {
            ListStep::Items(records) => Ok(records),
            ListStep::Fail => Err(SourceError::Unavailable("scripted list failure".into())),
            ListStep::Hang => {
                cancel.cancelled().await;
                Err(SourceError::Cancelled)
            }
        }
    }

    async fn get_metrics(
        &self,
        container_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContainerMetrics>, SourceError> {
        self.calls
            .lock()
            .push(SourceCall::Metrics(container_id.to_string()));
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);

        match self.next_metrics_step(container_id) {
            MetricsStep::Ready(metrics) => Ok(Some(metrics)),
            MetricsStep::Delayed(delay, metrics) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(SourceError::Cancelled),
                    _ = tokio::time::sleep(delay) => Ok(Some(metrics)),
                }
            }
            MetricsStep::Absent => Ok(None),
            MetricsStep::Fail => Err(SourceError::Protocol(format!(
                "scripted metrics failure for {container_id}"
            ))),
        }
    }
}
