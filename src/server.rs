//! Server settings translation and the accept/drain loop.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! Once the shutdown token fires, the loop:
//! 1. Immediately stops `listener.accept()` — no new connections are made.
//! 2. Lets in-flight connection tasks run, up to
//!    [`ServerSettings::shutdown_timeout`].
//! 3. Aborts whatever is still running when the budget elapses, so a hung
//!    connection cannot wedge shutdown.
//!
//! Keep `terminationGracePeriodSeconds` longer than `shutdown_timeout`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ConfigSource;
use crate::error::Error;
use crate::lifecycle::HostState;
use crate::middleware::{Pipeline, PingStatus, StatusFlag};
use crate::request::{BodyError, Request};
use crate::response::Response;

// ── Settings ─────────────────────────────────────────────────────────────────

/// Server knobs the adapter translates into hyper's native configuration.
///
/// Defaults are production-shaped; deployments override them through the
/// environment's config source (`server.*` keys) or
/// [`AppBuilder::setup_server`](crate::AppBuilder::setup_server).
#[derive(Clone, Debug)]
pub struct ServerSettings {
    /// Seeded from the service beacon. Customizations must leave it alone:
    /// [`AppBuilder::build`](crate::AppBuilder::build) rejects any change.
    pub bind_addr: SocketAddr,

    /// Requests with a larger body are rejected with `413` before the
    /// pipeline runs. `None` disables the limit.
    pub max_request_body_size: Option<u64>,

    /// hyper's per-connection read buffer cap, which also bounds the
    /// request line + headers.
    pub max_header_buffer_size: usize,

    /// How long hyper waits for a client to finish sending headers.
    pub header_read_timeout: Option<Duration>,

    /// HTTP/1.1 keep-alive.
    pub keep_alive: bool,

    /// Drain budget after the stop signal; see the module docs.
    pub shutdown_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            max_request_body_size: Some(30_000_000),
            max_header_buffer_size: 256 * 1024,
            header_read_timeout: Some(Duration::from_secs(30)),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerSettings {
    /// Settings for `addr` with every `server.*` override the config
    /// source carries applied on top of the defaults.
    pub fn from_config(addr: SocketAddr, config: &ConfigSource) -> Result<Self, Error> {
        let mut settings = Self { bind_addr: addr, ..Self::default() };

        if let Some(size) = config.get_u64("server.max-request-body-size")? {
            settings.max_request_body_size = (size > 0).then_some(size);
        }
        if let Some(size) = config.get_u64("server.max-header-buffer-size")? {
            // hyper's http1 connection rejects buffers below its own floor
            if size < 8192 {
                return Err(Error::config(
                    "server.max-header-buffer-size",
                    format!("`{size}` is below the 8192-byte minimum"),
                ));
            }
            settings.max_header_buffer_size = size as usize;
        }
        if let Some(timeout) = config.get_duration_secs("server.header-read-timeout-secs")? {
            settings.header_read_timeout = Some(timeout);
        }
        if let Some(keep_alive) = config.get_bool("server.keep-alive")? {
            settings.keep_alive = keep_alive;
        }
        if let Some(timeout) = config.get_duration_secs("server.shutdown-timeout-secs")? {
            settings.shutdown_timeout = timeout;
        }

        Ok(settings)
    }
}

// ── Serve loop ───────────────────────────────────────────────────────────────

/// Accepts connections until the shutdown token fires, then drains.
///
/// Publishes lifecycle transitions on `state` and flips the ping status to
/// `Stopping` the moment draining begins, so registries stop sending
/// traffic while in-flight requests finish.
pub(crate) async fn serve(
    listener: TcpListener,
    pipeline: Arc<Pipeline>,
    settings: ServerSettings,
    shutdown: CancellationToken,
    state: watch::Sender<HostState>,
    ping_status: StatusFlag,
) {
    let _ = state.send(HostState::Running);

    // JoinSet tracks every spawned connection task so the drain below can
    // wait for them.
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            // `biased` makes select! check arms top-to-bottom. Shutdown is
            // checked first so a stop signal wins over queued connections.
            biased;

            () = shutdown.cancelled() => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                tasks.spawn(serve_connection(
                    stream,
                    peer,
                    Arc::clone(&pipeline),
                    settings.clone(),
                ));
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    let _ = state.send(HostState::Stopping);
    ping_status.set(PingStatus::Stopping);

    let drained = tokio::time::timeout(settings.shutdown_timeout, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = tasks.len(),
            "shutdown timeout elapsed, aborting remaining connections"
        );
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }

    let _ = state.send(HostState::Stopped);
}

/// Serves one connection, HTTP/1.1 or HTTP/2 — whatever the client
/// negotiates.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    pipeline: Arc<Pipeline>,
    settings: ServerSettings,
) {
    // TokioIo adapts tokio's AsyncRead/AsyncWrite to the hyper IO traits.
    let io = TokioIo::new(stream);
    let body_limit = settings.max_request_body_size;

    // The closure is called once per request on the connection, not once
    // per connection.
    let svc = service_fn(move |req| {
        let pipeline = Arc::clone(&pipeline);
        async move { Ok::<_, std::convert::Infallible>(dispatch(pipeline, req, peer, body_limit).await) }
    });

    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .keep_alive(settings.keep_alive)
        .max_buf_size(settings.max_header_buffer_size);
    if let Some(timeout) = settings.header_read_timeout {
        builder.http1().header_read_timeout(timeout);
    }
    builder.http2().timer(TokioTimer::new());

    if let Err(e) = builder.serve_connection(io, svc).await {
        error!(peer = %peer, "connection error: {e}");
    }
}

/// Buffers one request and runs it through the pipeline.
///
/// The error type is [`Infallible`](std::convert::Infallible): failures
/// are expressed as responses (413, 400, a contained 500) so hyper never
/// sees an error.
async fn dispatch(
    pipeline: Arc<Pipeline>,
    req: hyper::Request<hyper::body::Incoming>,
    peer: SocketAddr,
    body_limit: Option<u64>,
) -> http::Response<http_body_util::Full<bytes::Bytes>> {
    let request = match Request::from_hyper(req, peer, body_limit).await {
        Ok(request) => request,
        Err(BodyError::TooLarge) => {
            return Response::status(http::StatusCode::PAYLOAD_TOO_LARGE).into_hyper();
        }
        Err(BodyError::Read) => {
            return Response::status(http::StatusCode::BAD_REQUEST).into_hyper();
        }
    };

    pipeline.handle(request).await.into_hyper()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> ConfigSource {
        ConfigSource::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        )
    }

    #[test]
    fn defaults_are_production_shaped() {
        let settings = ServerSettings::default();
        assert_eq!(settings.max_request_body_size, Some(30_000_000));
        assert_eq!(settings.max_header_buffer_size, 256 * 1024);
        assert_eq!(settings.header_read_timeout, Some(Duration::from_secs(30)));
        assert!(settings.keep_alive);
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn config_overrides_apply() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let source = config(&[
            ("server.max-request-body-size", "1024"),
            ("server.keep-alive", "false"),
            ("server.shutdown-timeout-secs", "5"),
        ]);

        let settings = ServerSettings::from_config(addr, &source).unwrap();
        assert_eq!(settings.bind_addr, addr);
        assert_eq!(settings.max_request_body_size, Some(1024));
        assert!(!settings.keep_alive);
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(5));
        // untouched keys keep their defaults
        assert_eq!(settings.max_header_buffer_size, 256 * 1024);
    }

    #[test]
    fn zero_body_limit_disables_it() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let source = config(&[("server.max-request-body-size", "0")]);
        let settings = ServerSettings::from_config(addr, &source).unwrap();
        assert_eq!(settings.max_request_body_size, None);
    }

    #[test]
    fn undersized_header_buffer_is_rejected() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let source = config(&[("server.max-header-buffer-size", "1024")]);
        assert!(matches!(
            ServerSettings::from_config(addr, &source),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn malformed_config_is_an_error() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let source = config(&[("server.keep-alive", "sometimes")]);
        assert!(matches!(
            ServerSettings::from_config(addr, &source),
            Err(Error::Config { .. })
        ));
    }
}
