//! The host: start/stop lifecycle around the serve loop.
//!
//! A [`Host`] is produced by [`AppBuilder::build`](crate::AppBuilder::build)
//! and runs in lock-step with the environment's shutdown token:
//! cancelling the token begins a graceful stop, and
//! [`wait_until_stopped`](Host::wait_until_stopped) returns once draining
//! finishes. [`run`](crate::run) drives both phases; they stay public for
//! callers that need the two-phase shape (start, then block elsewhere).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Error;
use crate::lifecycle::{HostLifetime, HostState};
use crate::middleware::{Pipeline, PingStatus, StatusFlag};
use crate::server::{self, ServerSettings};

pub struct Host {
    settings: ServerSettings,
    pipeline: Option<Arc<Pipeline>>,
    lifetime: HostLifetime,
    state_tx: Option<watch::Sender<HostState>>,
    shutdown: CancellationToken,
    ping_status: StatusFlag,
    serve_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("settings", &self.settings)
            .field("shutdown", &self.shutdown)
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl Host {
    pub(crate) fn new(
        settings: ServerSettings,
        pipeline: Pipeline,
        shutdown: &CancellationToken,
        ping_status: StatusFlag,
    ) -> Self {
        let (state_tx, lifetime) = crate::lifecycle::channel();
        Self {
            settings,
            pipeline: Some(Arc::new(pipeline)),
            lifetime,
            state_tx: Some(state_tx),
            // A child token: `stop` cancels only this host, while the
            // environment's token still stops every host built on it.
            shutdown: shutdown.child_token(),
            ping_status,
            serve_task: None,
            local_addr: None,
        }
    }

    /// Binds the beacon's address and starts serving.
    ///
    /// Returns once the host is accepting connections. If the shutdown
    /// token was already cancelled, the host starts and immediately begins
    /// a clean stop — not an error.
    pub async fn start(&mut self) -> Result<(), Error> {
        let (Some(pipeline), Some(state_tx)) = (self.pipeline.take(), self.state_tx.take()) else {
            return Err(Error::AlreadyStarted);
        };

        info!(addr = %self.settings.bind_addr, "starting host");

        let listener = TcpListener::bind(self.settings.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        self.serve_task = Some(tokio::spawn(server::serve(
            listener,
            pipeline,
            self.settings.clone(),
            self.shutdown.clone(),
            state_tx,
            self.ping_status.clone(),
        )));

        self.lifetime.started().await;
        info!(addr = %local_addr, "host started");
        Ok(())
    }

    /// Lifecycle events for this host.
    pub fn lifetime(&self) -> HostLifetime {
        self.lifetime.clone()
    }

    /// The actually bound address. Differs from the beacon when the beacon
    /// asked for port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Flips the status endpoint from `Warmup` to `Ok`.
    ///
    /// [`run`](crate::run) calls this after
    /// [`Application::warmup`](crate::Application::warmup) succeeds;
    /// two-phase callers do it themselves once ready for traffic.
    pub fn mark_ready(&self) {
        self.ping_status.set(PingStatus::Ok);
    }

    /// Begins a graceful stop of this host without touching the
    /// environment's shutdown token.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Blocks until the host has fully stopped and drained.
    pub async fn wait_until_stopped(&mut self) -> Result<(), Error> {
        self.lifetime.stopping().await;
        info!("stopping host");

        self.lifetime.stopped().await;
        info!("host stopped");

        if let Some(task) = self.serve_task.take() {
            task.await
                .map_err(|e| Error::Host(format!("serve loop did not finish cleanly: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Pipeline;
    use crate::router::Router;

    fn host(shutdown: &CancellationToken) -> Host {
        let settings = ServerSettings::default(); // 127.0.0.1:0
        let pipeline = Pipeline::new(vec![], Router::new(), String::new());
        Host::new(settings, pipeline, shutdown, StatusFlag::new())
    }

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let token = CancellationToken::new();
        let mut host = host(&token);
        host.start().await.unwrap();
        assert!(matches!(host.start().await, Err(Error::AlreadyStarted)));
        host.stop();
        host.wait_until_stopped().await.unwrap();
    }

    #[tokio::test]
    async fn environment_token_stops_the_host() {
        let token = CancellationToken::new();
        let mut host = host(&token);
        host.start().await.unwrap();
        assert_eq!(host.lifetime().state(), HostState::Running);

        token.cancel();
        host.wait_until_stopped().await.unwrap();
        assert_eq!(host.lifetime().state(), HostState::Stopped);
    }

    #[tokio::test]
    async fn host_stop_does_not_cancel_the_environment_token() {
        let token = CancellationToken::new();
        let mut host = host(&token);
        host.start().await.unwrap();

        host.stop();
        host.wait_until_stopped().await.unwrap();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn pre_cancelled_token_means_immediate_clean_stop() {
        let token = CancellationToken::new();
        token.cancel();

        let mut host = host(&token);
        host.start().await.unwrap();
        host.wait_until_stopped().await.unwrap();
        assert_eq!(host.lifetime().state(), HostState::Stopped);
    }
}
