//! Agent configuration
//!
//! Handles:
//! - Docker daemon endpoint
//! - Poll interval and engine budgets
//! - Log filter
//!
//! Read from a TOML file, then overridden by environment variables.

use anyhow::{Context, Result};
use aquarium_core::{EngineConfig, ListFailurePolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DOCKER_HOST_VAR: &str = "DOCKER_HOST";
pub const POLL_INTERVAL_VAR: &str = "AQUARIUM_POLL_INTERVAL_MS";

/// Where the daemon listens when neither the file nor `DOCKER_HOST` says.
#[cfg(unix)]
pub const DEFAULT_ENDPOINT: &str = "unix:///var/run/docker.sock";
#[cfg(windows)]
pub const DEFAULT_ENDPOINT: &str = "npipe:////./pipe/docker_engine";
#[cfg(not(any(unix, windows)))]
pub const DEFAULT_ENDPOINT: &str = "http://localhost:2375";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub docker: DockerConfig,
    pub monitor: MonitorConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    pub list_timeout_ms: u64,
    pub metrics_timeout_ms: u64,
    pub list_failure_policy: ListFailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            poll_interval_ms: aquarium_core::engine::DEFAULT_POLL_INTERVAL.as_millis() as u64,
            list_timeout_ms: engine.list_timeout.as_millis() as u64,
            metrics_timeout_ms: engine.metrics_timeout.as_millis() as u64,
            list_failure_policy: engine.list_failure_policy,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl AgentConfig {
    /// Load from `path`, or from the per-user location when `None`, then
    /// apply environment overrides. A missing file yields the defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_file_path()?,
        };

        let mut config = Self::from_file(&path).await?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("docker-aquarium");
        path.push("config.toml");
        Ok(path)
    }

    /// Apply `DOCKER_HOST` and `AQUARIUM_POLL_INTERVAL_MS` from `lookup`.
    /// The endpoint is kept as written; the Docker client parses it.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(DOCKER_HOST_VAR).filter(|h| !h.trim().is_empty()) {
            self.docker.endpoint = host.trim().to_string();
        }

        if let Some(raw) = lookup(POLL_INTERVAL_VAR) {
            self.monitor.poll_interval_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("{POLL_INTERVAL_VAR} must be milliseconds, got {raw:?}"))?;
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.poll_interval_ms.max(1))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_list_timeout(Duration::from_millis(self.monitor.list_timeout_ms))
            .with_metrics_timeout(Duration::from_millis(self.monitor.metrics_timeout_ms))
            .with_list_failure_policy(self.monitor.list_failure_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.docker.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.poll_interval(), Duration::from_millis(2000));
        assert_eq!(config.log.filter, "info");

        let engine = config.engine_config();
        assert_eq!(engine.list_timeout, Duration::from_secs(5));
        assert_eq!(engine.metrics_timeout, Duration::from_secs(1));
        assert_eq!(engine.list_failure_policy, ListFailurePolicy::TreatAsEmpty);
    }

    #[test]
    fn test_config_file_path() {
        let path = AgentConfig::config_file_path().unwrap();
        assert!(path.to_string_lossy().contains("docker-aquarium"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[monitor]\npoll_interval_ms = 500\nlist_failure_policy = \"keep_last\"\n"
        )
        .unwrap();

        let config = AgentConfig::from_file(file.path()).await.unwrap();
        assert_eq!(config.monitor.poll_interval_ms, 500);
        assert_eq!(
            config.monitor.list_failure_policy,
            ListFailurePolicy::KeepLast
        );
        assert_eq!(config.monitor.metrics_timeout_ms, 1000);
        assert_eq!(config.docker.endpoint, DEFAULT_ENDPOINT);
    }

    #[tokio::test]
    async fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig::from_file(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(config.monitor.poll_interval_ms, 2000);
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[monitor]\npoll_interval_ms = \"soon\"").unwrap();
        assert!(AgentConfig::from_file(file.path()).await.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AgentConfig::default();
        config
            .apply_env_overrides(env(&[
                ("DOCKER_HOST", "tcp://10.0.0.5:2375"),
                ("AQUARIUM_POLL_INTERVAL_MS", "750"),
            ]))
            .unwrap();

        assert_eq!(config.docker.endpoint, "tcp://10.0.0.5:2375");
        assert_eq!(config.poll_interval(), Duration::from_millis(750));
    }

    #[test]
    fn test_bad_interval_override_is_rejected() {
        let mut config = AgentConfig::default();
        let result = config.apply_env_overrides(env(&[("AQUARIUM_POLL_INTERVAL_MS", "fast")]));
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_default_endpoint_is_the_local_socket() {
        assert_eq!(DEFAULT_ENDPOINT, "unix:///var/run/docker.sock");
    }

    #[test]
    fn test_blank_docker_host_keeps_the_default() {
        let mut config = AgentConfig::default();
        config
            .apply_env_overrides(env(&[("DOCKER_HOST", "   ")]))
            .unwrap();
        assert_eq!(config.docker.endpoint, DEFAULT_ENDPOINT);
    }
}
