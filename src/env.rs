//! The hosting environment descriptor.
//!
//! A [`HostingEnvironment`] is the bundle of dependencies a deployment
//! injects into the application at startup: who the application is
//! (identity), where it listens (service beacon), how it is configured
//! (config source), which datacenter it lives in, how it logs, and when it
//! must stop (shutdown token). The adapter translates this descriptor into
//! the server's native configuration; application code receives it in
//! [`Application::setup`](crate::Application::setup) and
//! [`Application::warmup`](crate::Application::warmup).
//!
//! Constructing an environment is side-effect free: nothing binds sockets,
//! spawns tasks, or installs subscribers until the host is started.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ConfigSource;
use crate::error::Error;
use crate::logging::LogSettings;

// ── Application identity ─────────────────────────────────────────────────────

/// Who the application is, for logs and service registration.
///
/// Displays in dotted form: `project.environment.application.instance`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationIdentity {
    pub project: String,
    pub environment: String,
    pub application: String,
    pub instance: String,
}

impl ApplicationIdentity {
    pub fn new(
        project: impl Into<String>,
        environment: impl Into<String>,
        application: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            environment: environment.into(),
            application: application.into(),
            instance: instance.into(),
        }
    }
}

impl fmt::Display for ApplicationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.project, self.environment, self.application, self.instance
        )
    }
}

// ── Service beacon ───────────────────────────────────────────────────────────

/// The network binding the environment advertises for this application.
///
/// The beacon *owns* the binding: the host binds exactly this address, and
/// [`AppBuilder::build`](crate::AppBuilder::build) rejects any server
/// customization that tries to change it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceBeacon {
    addr: SocketAddr,
    base_path: String,
}

impl ServiceBeacon {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, base_path: String::new() }
    }

    /// Mounts the application under a path prefix. `"api"`, `"/api"` and
    /// `"/api/"` all normalize to `/api`.
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        let trimmed = base_path.trim_matches('/');
        self.base_path = if trimmed.is_empty() { String::new() } else { format!("/{trimmed}") };
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The normalized path prefix; empty when the application is mounted at
    /// the root.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

// ── Datacenters ──────────────────────────────────────────────────────────────

/// Datacenter topology as seen from this instance.
///
/// The admission-gate middleware consults this to decide whether the local
/// datacenter is currently taking traffic.
pub trait Datacenters: Send + Sync + 'static {
    /// Name of the datacenter this instance runs in, if known.
    fn local(&self) -> Option<&str>;

    /// Whether the local datacenter is currently active.
    fn local_is_active(&self) -> bool;
}

/// A fixed topology. The default (`unknown`, active) never denies traffic.
#[derive(Clone, Debug)]
pub struct StaticDatacenters {
    local: Option<String>,
    active: bool,
}

impl StaticDatacenters {
    pub fn new(local: Option<&str>, active: bool) -> Self {
        Self { local: local.map(str::to_owned), active }
    }
}

impl Default for StaticDatacenters {
    fn default() -> Self {
        Self { local: None, active: true }
    }
}

impl Datacenters for StaticDatacenters {
    fn local(&self) -> Option<&str> {
        self.local.as_deref()
    }

    fn local_is_active(&self) -> bool {
        self.active
    }
}

// ── Hosting environment ──────────────────────────────────────────────────────

/// The externally supplied bundle of dependencies the host runs against.
#[derive(Clone)]
pub struct HostingEnvironment {
    identity: ApplicationIdentity,
    beacon: ServiceBeacon,
    config: ConfigSource,
    datacenters: Arc<dyn Datacenters>,
    log: LogSettings,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for HostingEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostingEnvironment")
            .field("identity", &self.identity)
            .field("beacon", &self.beacon)
            .field("config", &self.config)
            .field("log", &self.log)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl HostingEnvironment {
    /// Starts building an environment. Identity and beacon are required;
    /// everything else has a default.
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    pub fn identity(&self) -> &ApplicationIdentity {
        &self.identity
    }

    pub fn beacon(&self) -> &ServiceBeacon {
        &self.beacon
    }

    pub fn config(&self) -> &ConfigSource {
        &self.config
    }

    pub fn datacenters(&self) -> &Arc<dyn Datacenters> {
        &self.datacenters
    }

    pub fn log_settings(&self) -> &LogSettings {
        &self.log
    }

    /// The shutdown signal. Cancelling it (from anywhere — it is cheap to
    /// clone) moves every host built on this environment into graceful
    /// shutdown.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Cancels the shutdown token on the first SIGTERM or Ctrl-C the
    /// process receives. Must be called from within a tokio runtime.
    pub fn shutdown_on_process_signals(&self) {
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            process_shutdown_signal().await;
            token.cancel();
        });
    }
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both SIGTERM (sent by `kubectl` and the
/// Kubernetes control plane) and SIGINT (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available.
async fn process_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}

// ── Environment builder ──────────────────────────────────────────────────────

/// Fluent constructor for [`HostingEnvironment`].
#[derive(Default)]
pub struct EnvironmentBuilder {
    identity: Option<ApplicationIdentity>,
    beacon: Option<ServiceBeacon>,
    config: ConfigSource,
    datacenters: Option<Arc<dyn Datacenters>>,
    log: LogSettings,
    shutdown: Option<CancellationToken>,
}

impl EnvironmentBuilder {
    pub fn identity(mut self, identity: ApplicationIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn beacon(mut self, beacon: ServiceBeacon) -> Self {
        self.beacon = Some(beacon);
        self
    }

    pub fn config(mut self, config: ConfigSource) -> Self {
        self.config = config;
        self
    }

    pub fn datacenters(mut self, datacenters: impl Datacenters) -> Self {
        self.datacenters = Some(Arc::new(datacenters));
        self
    }

    pub fn log_settings(mut self, log: LogSettings) -> Self {
        self.log = log;
        self
    }

    /// Uses an externally owned shutdown token instead of a fresh one.
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn build(self) -> Result<HostingEnvironment, Error> {
        Ok(HostingEnvironment {
            identity: self.identity.ok_or(Error::MissingEnvironmentComponent("an application identity"))?,
            beacon: self.beacon.ok_or(Error::MissingEnvironmentComponent("a service beacon"))?,
            config: self.config,
            datacenters: self.datacenters.unwrap_or_else(|| Arc::new(StaticDatacenters::default())),
            log: self.log,
            shutdown: self.shutdown.unwrap_or_default(),
        })
    }
}
