//! Docker Aquarium core - container monitoring engine
//!
//! Observes a changing set of containers through a [`MetricsSource`]:
//! - Polls the container list and detects membership changes
//! - Collects per-container metrics, each fetch under its own time budget
//! - Classifies container health from run state and latest metrics
//! - Publishes `ListChanged` / `MetricsUpdated` events to subscribers
//!
//! The engine only observes: lifecycle commands live on [`ContainerControl`]
//! and are driven by outer layers.

pub mod engine;
pub mod events;
pub mod health;
pub mod models;
pub mod source;
pub mod state;

pub use engine::{EngineConfig, EngineError, ListFailurePolicy, MonitoringEngine};
pub use events::{EventBus, EventSubscriber, MonitorEvent, SubscriptionId};
pub use health::{HealthEvaluator, ThresholdEvaluator};
pub use models::{ContainerInfo, ContainerMetrics, ContainerRecord, HealthStatus};
pub use source::{ContainerControl, MetricsSource, SourceError};

// re-exported so callers don't need a direct tokio-util dependency
pub use tokio_util::sync::CancellationToken;
