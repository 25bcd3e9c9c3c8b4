//! Contract between the engine and whatever talks to the container runtime.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::models::{ContainerMetrics, ContainerRecord};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),
    #[error("container not found: {0}")]
    NotFound(String),
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SourceError {
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SourceError::Transport(Box::new(err))
    }
}

/// Read side of the container runtime, polled by the engine.
///
/// Implementations should honour `cancel` and return promptly once it fires.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// All containers, running or not.
    async fn list_items(&self, cancel: &CancellationToken)
        -> Result<Vec<ContainerRecord>, SourceError>;

    /// Latest metrics for one container, `None` when the runtime has nothing.
    async fn get_metrics(
        &self,
        container_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContainerMetrics>, SourceError>;
}

/// Lifecycle commands. Invoked by outer layers, never by the engine.
#[async_trait]
pub trait ContainerControl: Send + Sync {
    async fn start(&self, container_id: &str, cancel: &CancellationToken) -> Result<(), SourceError>;
    async fn stop(&self, container_id: &str, cancel: &CancellationToken) -> Result<(), SourceError>;
    async fn pause(&self, container_id: &str, cancel: &CancellationToken) -> Result<(), SourceError>;
    async fn unpause(&self, container_id: &str, cancel: &CancellationToken)
        -> Result<(), SourceError>;
}
