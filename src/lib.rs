//! # berth
//!
//! A hosting adapter for Rust services. Nothing more. Nothing less.
//!
//! ## The contract
//!
//! Your deployment platform hands every service the same bundle at
//! startup: an identity, a network binding, a configuration source, a
//! datacenter topology, and a shutdown signal. berth translates that
//! bundle — the [`HostingEnvironment`] — into hyper's native server
//! configuration, installs a fixed chain of cross-cutting middlewares,
//! and runs the server's lifecycle in lock-step with the shutdown signal.
//!
//! hyper owns the hard parts — connection handling, HTTP/1.1 and HTTP/2
//! parsing — by design. What is left for berth is the only part that
//! changes between platforms:
//!
//! - **Environment translation** — config-source keys and beacon binding
//!   become [`ServerSettings`]; log settings become a `tracing` subscriber
//! - **An ordered middleware pipeline** — request info, distributed
//!   context, tracing, logging, datacenter gate, status endpoint, error
//!   containment, in that order, always
//! - **Lifecycle coordination** — start, warmup, and a graceful drain
//!   driven by a cancellation token
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use berth::{
//!     AppBuilder, Application, ApplicationIdentity, HostingEnvironment, Request, Response,
//!     Router, ServiceBeacon,
//! };
//!
//! struct UserApi;
//!
//! impl Application for UserApi {
//!     fn setup(&self, builder: &mut AppBuilder, _env: &HostingEnvironment) {
//!         builder.router(Router::new().get("/users/{id}", get_user));
//!     }
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), berth::Error> {
//!     let env = HostingEnvironment::builder()
//!         .identity(ApplicationIdentity::new("infra", "prod", "user-api", "1"))
//!         .beacon(ServiceBeacon::new("0.0.0.0:3000".parse().unwrap()))
//!         .build()?;
//!
//!     berth::logging::init(&env)?;
//!     env.shutdown_on_process_signals();
//!
//!     berth::run(UserApi, env).await
//! }
//! ```

mod app;
mod builder;
mod config;
mod env;
mod error;
mod handler;
mod host;
mod lifecycle;
mod request;
mod response;
mod router;
mod server;

pub mod logging;
pub mod middleware;

pub use app::{run, Application};
pub use builder::AppBuilder;
pub use config::ConfigSource;
pub use env::{
    ApplicationIdentity, Datacenters, EnvironmentBuilder, HostingEnvironment, ServiceBeacon,
    StaticDatacenters,
};
pub use error::Error;
pub use handler::Handler;
pub use host::Host;
pub use lifecycle::{HostLifetime, HostState};
pub use logging::{LogFormat, LogSettings};
pub use request::{DistributedContext, Request, RequestInfo, RequestPriority};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::ServerSettings;
