//! Data model shared by the engine, the classifier and event subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw container record as listed by a metrics source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String, // running, exited, paused, created...
}

impl ContainerRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        image: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: image.into(),
            state: state.into(),
        }
    }
}

/// Health verdict of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Stopped,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Point-in-time resource usage of one container.
///
/// A snapshot is never edited after collection: a newer snapshot replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetrics {
    pub cpu_percentage: f64,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
    pub network_input_bytes: u64,
    pub network_output_bytes: u64,
    pub collected_at: DateTime<Utc>,
}

impl ContainerMetrics {
    /// Memory usage as a percentage of the limit, 0 when no limit is known.
    pub fn memory_percentage(&self) -> f64 {
        if self.memory_limit_bytes > 0 {
            (self.memory_usage_bytes as f64 / self.memory_limit_bytes as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn total_network_bytes(&self) -> u64 {
        self.network_input_bytes
            .saturating_add(self.network_output_bytes)
    }
}

/// A container tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub health: HealthStatus,
    pub metrics: Option<ContainerMetrics>,
}

impl ContainerInfo {
    /// Build an item from a freshly listed record, without metrics.
    ///
    /// The verdict starts as `Stopped` and is expected to be recomputed by the
    /// caller through a [`HealthEvaluator`](crate::health::HealthEvaluator).
    pub fn from_record(record: ContainerRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            image: record.image,
            state: record.state,
            health: HealthStatus::Stopped,
            metrics: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }

    /// Display size factor (0-100), driven by memory usage.
    pub fn size_factor(&self) -> f64 {
        self.metrics
            .as_ref()
            .map(ContainerMetrics::memory_percentage)
            .unwrap_or(0.0)
    }

    /// Activity level (0-100) combining CPU and network throughput.
    pub fn activity_level(&self) -> f64 {
        let Some(metrics) = &self.metrics else {
            return 0.0;
        };

        let cpu_weight = metrics.cpu_percentage * 0.6;
        let network_mb = metrics.total_network_bytes() as f64 / 1_000_000.0;
        let network_weight = network_mb.min(100.0) * 0.4;
        (cpu_weight + network_weight).min(100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(cpu: f64, used: u64, limit: u64) -> ContainerMetrics {
        ContainerMetrics {
            cpu_percentage: cpu,
            memory_usage_bytes: used,
            memory_limit_bytes: limit,
            network_input_bytes: 0,
            network_output_bytes: 0,
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn test_is_running_ignores_case() {
        for state in ["running", "Running", "RUNNING"] {
            let info = ContainerInfo::from_record(ContainerRecord::new("a", "a", "img", state));
            assert!(info.is_running(), "{state} should be running");
        }
        for state in ["exited", "paused", "", "run"] {
            let info = ContainerInfo::from_record(ContainerRecord::new("a", "a", "img", state));
            assert!(!info.is_running(), "{state} should not be running");
        }
    }

    #[test]
    fn test_memory_percentage() {
        assert_eq!(metrics(0.0, 20, 100).memory_percentage(), 20.0);
        assert_eq!(metrics(0.0, 512, 0).memory_percentage(), 0.0);
        assert_eq!(metrics(0.0, 150, 100).memory_percentage(), 150.0);
    }

    #[test]
    fn test_total_network_bytes_saturates() {
        let mut m = metrics(0.0, 0, 0);
        m.network_input_bytes = 1_500;
        m.network_output_bytes = 500;
        assert_eq!(m.total_network_bytes(), 2_000);

        m.network_input_bytes = u64::MAX;
        assert_eq!(m.total_network_bytes(), u64::MAX);
    }

    #[test]
    fn test_size_factor_and_activity_level() {
        let mut info = ContainerInfo::from_record(ContainerRecord::new("a", "web", "nginx", "running"));
        assert_eq!(info.size_factor(), 0.0);
        assert_eq!(info.activity_level(), 0.0);

        let mut m = metrics(50.0, 25, 100);
        m.network_input_bytes = 10_000_000;
        m.network_output_bytes = 10_000_000;
        info.metrics = Some(m);

        assert_eq!(info.size_factor(), 25.0);
        // 50 * 0.6 + 20 * 0.4
        assert!((info.activity_level() - 38.0).abs() < 1e-9);

        let mut busy = metrics(100.0, 0, 0);
        busy.network_input_bytes = 500_000_000;
        info.metrics = Some(busy);
        assert_eq!(info.activity_level(), 100.0);
    }

    #[test]
    fn test_health_status_serializes_lowercase() {
        let json = serde_json::to_string(&HealthStatus::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        assert_eq!(HealthStatus::Stopped.to_string(), "stopped");
    }
}
