//! Docker Engine API client
//!
//! Talks to the daemon over its HTTP API, carried by a unix socket
//! (`unix:///var/run/docker.sock`), a Windows named pipe
//! (`npipe:////./pipe/docker_engine`) or TCP (`tcp://` / `http(s)://`).
//! Implements both the read side polled by the engine and the lifecycle
//! commands used by the CLI.

mod models;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use aquarium_core::{
    CancellationToken, ContainerControl, ContainerMetrics, ContainerRecord, MetricsSource,
    SourceError,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use tracing::{debug, info};

use models::{ContainerSummary, StatsResponse};

/// Seconds the daemon waits before killing a container on stop.
const STOP_GRACE_SECS: u32 = 5;

/// Host used in request URLs when the transport is a socket or a pipe.
const LOCAL_BASE_URL: &str = "http://localhost";

/// Where the daemon listens, parsed from a `DOCKER_HOST`-style string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Http(String),
    Unix(PathBuf),
    NamedPipe(String),
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, SourceError> {
        let raw = raw.trim();

        if let Some(path) = raw.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(SourceError::Unavailable(format!(
                    "Docker endpoint {raw:?} has no socket path"
                )));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        if let Some(pipe) = raw.strip_prefix("npipe://") {
            if pipe.is_empty() {
                return Err(SourceError::Unavailable(format!(
                    "Docker endpoint {raw:?} has no pipe name"
                )));
            }
            return Ok(Self::NamedPipe(pipe.replace('/', "\\")));
        }

        // `tcp://host:port` is how Docker spells plain HTTP endpoints.
        if let Some(rest) = raw.strip_prefix("tcp://") {
            return Ok(Self::Http(format!("http://{}", rest.trim_end_matches('/'))));
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(Self::Http(raw.trim_end_matches('/').to_string()));
        }

        Err(SourceError::Unavailable(format!(
            "unsupported Docker endpoint {raw:?}: expected unix://, npipe://, tcp://, http:// or https://"
        )))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(url) => f.write_str(url),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::NamedPipe(pipe) => write!(f, "npipe://{}", pipe.replace('\\', "/")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DockerClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    base_url: String,
}

impl DockerClient {
    /// Build a client for `endpoint`. Endpoints this platform cannot reach
    /// are rejected here rather than on every request.
    pub fn new(endpoint: &str) -> Result<Self, SourceError> {
        let endpoint = Endpoint::parse(endpoint)?;
        let builder = reqwest::Client::builder()
            .user_agent(concat!("docker-aquarium/", env!("CARGO_PKG_VERSION")))
            .no_proxy();

        let (builder, base_url) = match &endpoint {
            Endpoint::Http(url) => (builder, url.clone()),
            #[cfg(unix)]
            Endpoint::Unix(path) => (builder.unix_socket(path.clone()), LOCAL_BASE_URL.to_string()),
            #[cfg(target_os = "windows")]
            Endpoint::NamedPipe(pipe) => (
                builder.windows_named_pipe(pipe.clone()),
                LOCAL_BASE_URL.to_string(),
            ),
            other => {
                return Err(SourceError::Unavailable(format!(
                    "Docker endpoint {other} is not supported on this platform"
                )))
            }
        };

        let http = builder.build().map_err(SourceError::transport)?;
        Ok(Self {
            http,
            endpoint,
            base_url,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn lifecycle(
        &self,
        container_id: &str,
        action: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        let path = match action {
            "stop" => format!("/containers/{container_id}/stop?t={STOP_GRACE_SECS}"),
            _ => format!("/containers/{container_id}/{action}"),
        };

        cancellable(cancel, async {
            let response = self
                .http
                .post(self.url(&path))
                .send()
                .await
                .map_err(request_error)?;

            match response.status() {
                StatusCode::NOT_MODIFIED => {
                    debug!(container_id, action, "Container already in requested state");
                    Ok(())
                }
                status if status.is_success() => {
                    info!(container_id, action, "Container lifecycle command succeeded");
                    Ok(())
                }
                StatusCode::NOT_FOUND => Err(SourceError::NotFound(container_id.to_string())),
                status => {
                    let body = response.text().await.unwrap_or_default();
                    Err(SourceError::Protocol(format!(
                        "{status} on POST {path}: {}",
                        body.trim()
                    )))
                }
            }
        })
        .await
    }
}

/// Race `operation` against `cancel`.
async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, SourceError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SourceError::Cancelled),
        result = operation => result,
    }
}

fn request_error(err: reqwest::Error) -> SourceError {
    if err.is_connect() {
        SourceError::Unavailable(err.to_string())
    } else {
        SourceError::transport(err)
    }
}

fn unexpected_status(status: StatusCode, path: &str) -> SourceError {
    SourceError::Protocol(format!("{status} on GET {path}"))
}

#[async_trait]
impl MetricsSource for DockerClient {
    async fn list_items(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContainerRecord>, SourceError> {
        let path = "/containers/json?all=true";

        cancellable(cancel, async {
            let response = self
                .http
                .get(self.url(path))
                .send()
                .await
                .map_err(request_error)?;
            if !response.status().is_success() {
                return Err(unexpected_status(response.status(), path));
            }

            let summaries: Vec<ContainerSummary> =
                response.json().await.map_err(SourceError::transport)?;
            Ok(summaries
                .into_iter()
                .map(ContainerSummary::into_record)
                .collect())
        })
        .await
    }

    async fn get_metrics(
        &self,
        container_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContainerMetrics>, SourceError> {
        let path = format!("/containers/{container_id}/stats?stream=false");

        cancellable(cancel, async {
            let response = self
                .http
                .get(self.url(&path))
                .send()
                .await
                .map_err(request_error)?;

            match response.status() {
                StatusCode::NOT_FOUND => return Ok(None),
                status if !status.is_success() => return Err(unexpected_status(status, &path)),
                _ => {}
            }

            let stats: StatsResponse = response.json().await.map_err(SourceError::transport)?;
            Ok(Some(stats.to_metrics(Utc::now())))
        })
        .await
    }
}

#[async_trait]
impl ContainerControl for DockerClient {
    async fn start(&self, container_id: &str, cancel: &CancellationToken) -> Result<(), SourceError> {
        self.lifecycle(container_id, "start", cancel).await
    }

    async fn stop(&self, container_id: &str, cancel: &CancellationToken) -> Result<(), SourceError> {
        self.lifecycle(container_id, "stop", cancel).await
    }

    async fn pause(&self, container_id: &str, cancel: &CancellationToken) -> Result<(), SourceError> {
        self.lifecycle(container_id, "pause", cancel).await
    }

    async fn unpause(
        &self,
        container_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        self.lifecycle(container_id, "unpause", cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer a single request on `socket` and return its request line.
    async fn respond<S>(mut socket: S, status: &str, body: &str) -> String
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();

        String::from_utf8_lossy(&request)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// One-shot HTTP server: answers a single request with `status` and
    /// `body`, and hands back the request line it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let task = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            respond(socket, status, body).await
        });

        (endpoint, task)
    }

    #[tokio::test]
    async fn test_list_items() {
        let (endpoint, server) = serve_once(
            "200 OK",
            r#"[{"Id":"abcdef0123456789","Names":["/web"],"Image":"nginx","State":"running"}]"#,
        )
        .await;
        let client = DockerClient::new(&endpoint).unwrap();

        let records = client.list_items(&CancellationToken::new()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "web");
        assert_eq!(
            server.await.unwrap(),
            "GET /containers/json?all=true HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_missing_container_has_no_metrics() {
        let (endpoint, server) =
            serve_once("404 Not Found", r#"{"message":"No such container: gone"}"#).await;
        let client = DockerClient::new(&endpoint).unwrap();

        let metrics = client
            .get_metrics("gone", &CancellationToken::new())
            .await
            .unwrap();
        assert!(metrics.is_none());
        assert_eq!(
            server.await.unwrap(),
            "GET /containers/gone/stats?stream=false HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_stop_passes_grace_period() {
        let (endpoint, server) = serve_once("204 No Content", "").await;
        let client = DockerClient::new(&endpoint).unwrap();

        client.stop("web", &CancellationToken::new()).await.unwrap();
        assert_eq!(server.await.unwrap(), "POST /containers/web/stop?t=5 HTTP/1.1");
    }

    #[tokio::test]
    async fn test_already_started_is_success() {
        let (endpoint, server) = serve_once("304 Not Modified", "").await;
        let client = DockerClient::new(&endpoint).unwrap();

        client.start("web", &CancellationToken::new()).await.unwrap();
        assert_eq!(server.await.unwrap(), "POST /containers/web/start HTTP/1.1");
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let (endpoint, _server) = serve_once("404 Not Found", r#"{"message":"no such"}"#).await;
        let client = DockerClient::new(&endpoint).unwrap();
        let err = client.pause("ghost", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(id) if id == "ghost"));

        let (endpoint, _server) =
            serve_once("409 Conflict", r#"{"message":"container is not running"}"#).await;
        let client = DockerClient::new(&endpoint).unwrap();
        let err = client.unpause("web", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SourceError::Protocol(msg) if msg.contains("not running")));
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let client = DockerClient::new("http://127.0.0.1:9").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client.list_items(&cancel).await.unwrap_err();
        assert!(matches!(err, SourceError::Cancelled));
    }

    #[tokio::test]
    async fn test_closed_port_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = DockerClient::new(&endpoint).unwrap();
        let err = client.list_items(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let client = DockerClient::new("http://localhost:2375/").unwrap();
        assert_eq!(client.endpoint().to_string(), "http://localhost:2375");
        assert_eq!(
            client.url("/containers/json"),
            "http://localhost:2375/containers/json"
        );
    }

    #[test]
    fn test_endpoint_schemes() {
        assert_eq!(
            Endpoint::parse("tcp://10.0.0.5:2375").unwrap(),
            Endpoint::Http("http://10.0.0.5:2375".into())
        );
        assert_eq!(
            Endpoint::parse("https://docker.internal:2376/").unwrap(),
            Endpoint::Http("https://docker.internal:2376".into())
        );

        let unix = Endpoint::parse("unix:///var/run/docker.sock").unwrap();
        assert_eq!(unix, Endpoint::Unix(PathBuf::from("/var/run/docker.sock")));
        assert_eq!(unix.to_string(), "unix:///var/run/docker.sock");

        let pipe = Endpoint::parse("npipe:////./pipe/docker_engine").unwrap();
        assert_eq!(pipe, Endpoint::NamedPipe(r"\\.\pipe\docker_engine".into()));
        assert_eq!(pipe.to_string(), "npipe:////./pipe/docker_engine");
    }

    #[test]
    fn test_unsupported_endpoint_is_rejected_up_front() {
        for raw in ["ftp://docker:21", "/var/run/docker.sock", "localhost:2375", "unix://"] {
            let err = DockerClient::new(raw).unwrap_err();
            assert!(matches!(err, SourceError::Unavailable(_)), "{raw}: {err:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_named_pipe_is_rejected_off_windows() {
        let err = DockerClient::new("npipe:////./pipe/docker_engine").unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(msg) if msg.contains("not supported")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_items_over_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("docker.sock");
        let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            respond(
                socket,
                "200 OK",
                r#"[{"Id":"abcdef0123456789","Names":["/db"],"Image":"postgres:16","State":"exited"}]"#,
            )
            .await
        });

        let client = DockerClient::new(&format!("unix://{}", socket_path.display())).unwrap();
        assert_eq!(client.url("/_ping"), "http://localhost/_ping");

        let records = client.list_items(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            records,
            vec![ContainerRecord::new("abcdef0123456789", "db", "postgres:16", "exited")]
        );
        assert_eq!(
            server.await.unwrap(),
            "GET /containers/json?all=true HTTP/1.1"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_unix_socket_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = format!("unix://{}", dir.path().join("absent.sock").display());

        let client = DockerClient::new(&endpoint).unwrap();
        let err = client.list_items(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)), "{err:?}");
    }
}
