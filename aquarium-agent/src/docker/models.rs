//! Wire types of the Docker Engine API, limited to the fields we read.

use aquarium_core::{ContainerMetrics, ContainerRecord};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

const SHORT_ID_LEN: usize = 12;

/// One entry of `GET /containers/json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    pub state: Option<String>,
}

impl ContainerSummary {
    /// First name without its leading `/`, else the short id.
    pub fn display_name(&self) -> String {
        match self.names.first() {
            Some(name) => name.trim_start_matches('/').to_string(),
            None => self.id.chars().take(SHORT_ID_LEN).collect(),
        }
    }

    pub fn into_record(self) -> ContainerRecord {
        let name = self.display_name();
        let state = self.state.unwrap_or_else(|| "unknown".to_string());
        ContainerRecord::new(self.id, name, self.image, state)
    }
}

/// Body of `GET /containers/{id}/stats?stream=false`.
#[derive(Debug, Default, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub cpu_stats: CpuStats,
    #[serde(default)]
    pub precpu_stats: CpuStats,
    #[serde(default)]
    pub memory_stats: MemoryStats,
    #[serde(default)]
    pub networks: Option<HashMap<String, NetworkStats>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CpuStats {
    #[serde(default)]
    pub cpu_usage: CpuUsage,
    pub system_cpu_usage: Option<u64>,
    pub online_cpus: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,
    pub percpu_usage: Option<Vec<u64>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MemoryStats {
    #[serde(default)]
    pub usage: u64,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkStats {
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_bytes: u64,
}

impl StatsResponse {
    fn cpu_count(&self) -> u32 {
        let cpu = &self.cpu_stats;
        cpu.online_cpus
            .filter(|count| *count > 0)
            .or_else(|| {
                cpu.cpu_usage
                    .percpu_usage
                    .as_ref()
                    .map(|per_cpu| per_cpu.len() as u32)
                    .filter(|count| *count > 0)
            })
            .unwrap_or(1)
    }

    /// CPU usage since the previous sample, scaled to all cores and capped at 100.
    pub fn cpu_percentage(&self) -> f64 {
        let cpu_delta = self
            .cpu_stats
            .cpu_usage
            .total_usage
            .saturating_sub(self.precpu_stats.cpu_usage.total_usage);
        let system_delta = self
            .cpu_stats
            .system_cpu_usage
            .unwrap_or(0)
            .saturating_sub(self.precpu_stats.system_cpu_usage.unwrap_or(0));

        if system_delta == 0 {
            return 0.0;
        }

        let percent = (cpu_delta as f64 / system_delta as f64) * self.cpu_count() as f64 * 100.0;
        percent.min(100.0)
    }

    /// Received and transmitted bytes, summed over every interface.
    pub fn network_totals(&self) -> (u64, u64) {
        self.networks
            .iter()
            .flat_map(|networks| networks.values())
            .fold((0u64, 0u64), |(rx, tx), net| {
                (rx.saturating_add(net.rx_bytes), tx.saturating_add(net.tx_bytes))
            })
    }

    pub fn to_metrics(&self, collected_at: DateTime<Utc>) -> ContainerMetrics {
        let (network_input_bytes, network_output_bytes) = self.network_totals();
        ContainerMetrics {
            cpu_percentage: self.cpu_percentage(),
            memory_usage_bytes: self.memory_stats.usage,
            memory_limit_bytes: self.memory_stats.limit,
            network_input_bytes,
            network_output_bytes,
            collected_at,
        }
    }
}
