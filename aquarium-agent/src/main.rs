//! Docker Aquarium Agent - watches a Docker daemon and reports container health
//!
//! - `watch` (default): polls the daemon and logs every monitor event as JSON
//! - `start` / `stop` / `pause` / `unpause`: one-shot lifecycle commands

mod config;
mod console;
mod docker;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use aquarium_core::{CancellationToken, ContainerControl, MonitoringEngine};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::AgentConfig;
use console::ConsoleSubscriber;
use docker::DockerClient;

/// How often `watch` checks that the monitoring loop is still alive.
const LIVENESS_CHECK: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(name = "aquarium-agent", version, about = "Watch Docker containers and their health")]
struct Cli {
    /// Config file (defaults to the per-user docker-aquarium/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Monitor containers until Ctrl-C
    Watch {
        /// Poll interval in milliseconds, overrides the configuration
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: Option<u64>,
    },
    /// Start a container
    Start { id: String },
    /// Stop a container (5 s grace period)
    Stop { id: String },
    /// Pause a container
    Pause { id: String },
    /// Unpause a container
    Unpause { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AgentConfig::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    init_logging(&config.log.filter);

    let client = Arc::new(
        DockerClient::new(&config.docker.endpoint).context("Failed to create Docker client")?,
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
            }
            shutdown.cancel();
        }
    });

    match cli.command.unwrap_or(Command::Watch { interval_ms: None }) {
        Command::Watch { interval_ms } => {
            let poll_interval = interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.poll_interval());
            watch(client, &config, poll_interval, shutdown).await
        }
        Command::Start { id } => client
            .start(&id, &shutdown)
            .await
            .with_context(|| format!("Failed to start container {id}")),
        Command::Stop { id } => client
            .stop(&id, &shutdown)
            .await
            .with_context(|| format!("Failed to stop container {id}")),
        Command::Pause { id } => client
            .pause(&id, &shutdown)
            .await
            .with_context(|| format!("Failed to pause container {id}")),
        Command::Unpause { id } => client
            .unpause(&id, &shutdown)
            .await
            .with_context(|| format!("Failed to unpause container {id}")),
    }
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn watch(
    client: Arc<DockerClient>,
    config: &AgentConfig,
    poll_interval: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(endpoint = %client.endpoint(), "Watching Docker daemon");

    let engine = MonitoringEngine::new(client, config.engine_config());
    engine.events().subscribe(Arc::new(ConsoleSubscriber));

    if !engine.start(poll_interval, &shutdown) {
        bail!("Monitoring loop could not be started");
    }

    let mut liveness = tokio::time::interval(LIVENESS_CHECK);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = liveness.tick() => {
                if !engine.is_running() && !shutdown.is_cancelled() {
                    engine.stop().await;
                    bail!("Monitoring loop terminated unexpectedly");
                }
            }
        }
    }

    engine.stop().await;
    let tracked = engine.current_items().len();
    if tracked == 0 {
        warn!("No containers were observed");
    }
    info!(containers = tracked, "Agent stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_watch() {
        let cli = Cli::try_parse_from(["aquarium-agent"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_watch_with_interval_and_global_config() {
        let cli = Cli::try_parse_from([
            "aquarium-agent",
            "watch",
            "--interval-ms",
            "500",
            "--config",
            "/tmp/aquarium.toml",
        ])
        .unwrap();

        assert!(matches!(cli.command, Some(Command::Watch { interval_ms: Some(500) })));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/aquarium.toml")));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert!(Cli::try_parse_from(["aquarium-agent", "watch", "--interval-ms", "0"]).is_err());
    }

    #[test]
    fn test_lifecycle_commands_need_an_id() {
        let cli = Cli::try_parse_from(["aquarium-agent", "pause", "web"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Pause { id }) if id == "web"));
        assert!(Cli::try_parse_from(["aquarium-agent", "stop"]).is_err());
    }
}
