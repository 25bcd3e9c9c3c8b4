//! Health classification of a container from its run state and latest metrics.
//!
//! Decision order, first match wins:
//! 1. not running → `Stopped`
//! 2. no metrics snapshot → `Warning`
//! 3. cpu ≥ 95% or memory ≥ 95% → `Critical`
//! 4. cpu ≥ 80% or memory ≥ 85% → `Warning`
//! 5. otherwise → `Healthy`

use crate::models::{ContainerInfo, HealthStatus};

pub const HIGH_CPU_THRESHOLD: f64 = 80.0;
pub const HIGH_MEMORY_THRESHOLD: f64 = 85.0;
pub const CRITICAL_CPU_THRESHOLD: f64 = 95.0;
pub const CRITICAL_MEMORY_THRESHOLD: f64 = 95.0;

/// Maps a container to a health verdict. Must be pure and total.
pub trait HealthEvaluator: Send + Sync {
    fn evaluate(&self, container: &ContainerInfo) -> HealthStatus;
}

/// Fixed-threshold evaluator used by the engine unless told otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdEvaluator;

impl HealthEvaluator for ThresholdEvaluator {
    fn evaluate(&self, container: &ContainerInfo) -> HealthStatus {
        if !container.is_running() {
            return HealthStatus::Stopped;
        }

        // running without data is degraded, not healthy
        let Some(metrics) = &container.metrics else {
            return HealthStatus::Warning;
        };

        let cpu = metrics.cpu_percentage;
        let memory = metrics.memory_percentage();

        if cpu >= CRITICAL_CPU_THRESHOLD || memory >= CRITICAL_MEMORY_THRESHOLD {
            HealthStatus::Critical
        } else if cpu >= HIGH_CPU_THRESHOLD || memory >= HIGH_MEMORY_THRESHOLD {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

pub fn evaluate(container: &ContainerInfo) -> HealthStatus {
    ThresholdEvaluator.evaluate(container)
}
