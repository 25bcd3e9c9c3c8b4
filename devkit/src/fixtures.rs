/*!
Fixture builders for records and metrics snapshots.
*/

use aquarium_core::{ContainerMetrics, ContainerRecord};
use chrono::Utc;

/// Container record named after its id, with a stock image.
pub fn record(id: &str, state: &str) -> ContainerRecord {
    ContainerRecord::new(id, format!("{id}-name"), "alpine:3.20", state)
}

/// Metrics snapshot with the given cpu% and memory used/limit, no network.
pub fn metrics(cpu_percentage: f64, memory_used: u64, memory_limit: u64) -> ContainerMetrics {
    ContainerMetrics {
        cpu_percentage,
        memory_usage_bytes: memory_used,
        memory_limit_bytes: memory_limit,
        network_input_bytes: 0,
        network_output_bytes: 0,
        collected_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let r = record("web", "running");
        assert_eq!(r.id, "web");
        assert_eq!(r.name, "web-name");
        assert_eq!(r.state, "running");

        let m = metrics(10.0, 20, 100);
        assert_eq!(m.memory_percentage(), 20.0);
        assert_eq!(m.total_network_bytes(), 0);
    }
}
