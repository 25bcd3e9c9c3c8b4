/*!
Test harness for the monitoring engine

Wires a `ScriptedSource` and an `EventRecorder` to a `MonitoringEngine` and
offers waiting helpers that play well with tokio's paused clock.
*/

use crate::source_stub::ScriptedSource;
use aquarium_core::{
    CancellationToken, ContainerInfo, ContainerMetrics, EngineConfig, EventSubscriber,
    MonitorEvent, MonitoringEngine,
};
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Subscriber that keeps every event it sees, in order.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<MonitorEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Item lists carried by every `ListChanged`, in order.
    pub fn list_changes(&self) -> Vec<Vec<ContainerInfo>> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                MonitorEvent::ListChanged { items } => Some(items.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(container_id, snapshot)` pairs of every `MetricsUpdated`, in order.
    pub fn metrics_updates(&self) -> Vec<(String, ContainerMetrics)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                MonitorEvent::MetricsUpdated {
                    container_id,
                    metrics,
                } => Some((container_id.clone(), metrics.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn metrics_updates_for(&self, container_id: &str) -> usize {
        self.metrics_updates()
            .iter()
            .filter(|(id, _)| id == container_id)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSubscriber for EventRecorder {
    fn on_event(&self, event: &MonitorEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Complete engine test setup
pub struct TestHarness {
    pub source: Arc<ScriptedSource>,
    pub engine: MonitoringEngine,
    pub recorder: Arc<EventRecorder>,
    pub cancel: CancellationToken,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_test_logging();

        let source = Arc::new(ScriptedSource::new());
        let engine = MonitoringEngine::new(source.clone(), config);
        let recorder = Arc::new(EventRecorder::new());
        engine.events().subscribe(recorder.clone());

        Self {
            source,
            engine,
            recorder,
            cancel: CancellationToken::new(),
        }
    }

    pub fn start(&self, poll_interval: Duration) -> bool {
        self.engine.start(poll_interval, &self.cancel)
    }

    pub async fn stop(&self) {
        self.engine.stop().await;
    }

    /// Wait until `condition` holds on the recorder, or fail after `limit`.
    pub async fn wait_until<F>(&self, limit: Duration, condition: F) -> Result<()>
    where
        F: Fn(&EventRecorder) -> bool,
    {
        let recorder = Arc::clone(&self.recorder);
        let polled = tokio::time::timeout(limit, async move {
            while !condition(&recorder) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        polled.map_err(|_| {
            anyhow::anyhow!(
                "condition not met within {:?}; recorded {} events",
                limit,
                self.recorder.len()
            )
        })
    }

    /// Let the engine run for `duration` of (possibly paused) time.
    pub async fn advance(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    pub fn item(&self, container_id: &str) -> Option<ContainerInfo> {
        self.engine
            .current_items()
            .into_iter()
            .find(|item| item.id == container_id)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
