//! The request-middleware pipeline.
//!
//! Every request flows through a fixed, ordered chain of built-in stages
//! before reaching the router:
//!
//! ```text
//! request info → distributed context → tracing → logging
//!     → datacenter gate → status endpoint → error containment
//!     → user middlewares → router
//! ```
//!
//! The order is deliberate and not configurable: metadata stages run
//! first so every later stage can rely on [`RequestInfo`] and
//! [`DistributedContext`](crate::DistributedContext) being present;
//! tracing wraps logging so log events carry the request span; the gate
//! and status endpoint sit inside both so denials and pings are observed
//! like any other response; containment sits innermost so tracing and
//! logging record the contained response rather than an error.
//!
//! User middlewares registered through
//! [`AppBuilder::add_middleware`](crate::AppBuilder::add_middleware) run
//! after the built-in chain, inside containment, in registration order.
//!
//! [`RequestInfo`]: crate::RequestInfo

mod deny_requests;
mod distributed_context;
mod ping_api;
mod request_info;
mod request_logging;
mod request_tracing;
mod unhandled_errors;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

pub use deny_requests::DenyRequestsSettings;
pub use distributed_context::DistributedContextSettings;
pub use ping_api::{PingApiSettings, PingStatus};
pub use request_info::RequestInfoSettings;
pub use request_logging::RequestLoggingSettings;
pub use request_tracing::RequestTracingSettings;
pub use unhandled_errors::UnhandledErrorsSettings;

pub(crate) use deny_requests::DenyRequests;
pub(crate) use distributed_context::RestoreDistributedContext;
pub(crate) use ping_api::{PingApi, StatusFlag};
pub(crate) use request_info::FillRequestInfo;
pub(crate) use request_logging::RequestLogging;
pub(crate) use request_tracing::RequestTracing;
pub(crate) use unhandled_errors::UnhandledErrors;

// ── Middleware trait ─────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future resolving to a middleware result.
pub type MiddlewareFuture =
    Pin<Box<dyn Future<Output = Result<Response, Error>> + Send + 'static>>;

/// A pipeline stage invoked around request handling.
///
/// Implementations receive the request and a [`Next`] driving the rest of
/// the chain. The returned future must be `'static`: clone whatever state
/// you need into it.
///
/// ```rust
/// use berth::middleware::{Middleware, MiddlewareFuture, Next};
/// use berth::Request;
///
/// struct ServerHeader;
///
/// impl Middleware for ServerHeader {
///     fn call(&self, req: Request, next: Next) -> MiddlewareFuture {
///         Box::pin(async move {
///             let mut resp = next.run(req).await?;
///             resp.headers_mut()
///                 .insert("server", "berth".parse().expect("valid header"));
///             Ok(resp)
///         })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> MiddlewareFuture;
}

/// The remainder of the pipeline after the current stage.
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    terminal: Arc<RouterDispatch>,
}

impl Next {
    /// Runs the rest of the chain, terminating in the router.
    pub fn run(self, req: Request) -> MiddlewareFuture {
        match self.chain.get(self.index) {
            Some(stage) => {
                let stage = Arc::clone(stage);
                let next = Next { chain: self.chain, index: self.index + 1, terminal: self.terminal };
                stage.call(req, next)
            }
            None => {
                let terminal = self.terminal;
                Box::pin(async move { Ok(terminal.dispatch(req).await) })
            }
        }
    }
}

// ── Terminal stage ───────────────────────────────────────────────────────────

/// Routes a request once the chain lets it through. Infallible: an
/// unmatched route is a 404, not an error.
pub(crate) struct RouterDispatch {
    router: Router,
    base_path: String,
}

impl RouterDispatch {
    async fn dispatch(&self, mut req: Request) -> Response {
        let Some(path) = strip_base_path(req.path(), &self.base_path) else {
            return Response::status(StatusCode::NOT_FOUND);
        };

        match self.router.lookup(req.method(), &path) {
            Some((handler, params)) => {
                req.set_params(params);
                handler.call(req).await
            }
            None => Response::status(StatusCode::NOT_FOUND),
        }
    }
}

/// Strips the beacon's base path, returning the application-relative path.
/// `None` means the request lives outside the mount point.
fn strip_base_path(path: &str, base_path: &str) -> Option<String> {
    if base_path.is_empty() {
        return Some(path.to_owned());
    }
    let rest = path.strip_prefix(base_path)?;
    if rest.is_empty() {
        Some("/".to_owned())
    } else if rest.starts_with('/') {
        Some(rest.to_owned())
    } else {
        None // `/apix` does not live under `/api`
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// The assembled chain plus its terminal router stage.
pub(crate) struct Pipeline {
    chain: Arc<[Arc<dyn Middleware>]>,
    terminal: Arc<RouterDispatch>,
}

impl Pipeline {
    pub(crate) fn new(chain: Vec<Arc<dyn Middleware>>, router: Router, base_path: String) -> Self {
        Self {
            chain: chain.into(),
            terminal: Arc::new(RouterDispatch { router, base_path }),
        }
    }

    pub(crate) async fn handle(&self, req: Request) -> Response {
        let next = Next {
            chain: Arc::clone(&self.chain),
            index: 0,
            terminal: Arc::clone(&self.terminal),
        };
        match next.run(req).await {
            Ok(response) => response,
            // Containment normally converts errors; anything arriving here
            // escaped from a stage outside it.
            Err(error) => {
                tracing::error!(%error, "request failed outside the containment stage");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use pretty_assertions::assert_eq;

    #[test]
    fn base_path_stripping() {
        assert_eq!(strip_base_path("/users", "").as_deref(), Some("/users"));
        assert_eq!(strip_base_path("/api/users", "/api").as_deref(), Some("/users"));
        assert_eq!(strip_base_path("/api", "/api").as_deref(), Some("/"));
        assert_eq!(strip_base_path("/apix/users", "/api"), None);
        assert_eq!(strip_base_path("/other", "/api"), None);
    }

    #[tokio::test]
    async fn empty_chain_reaches_router() {
        let pipeline = test_support::pipeline(vec![]);
        let resp = pipeline.handle(Request::test(Method::GET, "/ok")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), b"ok");
    }

    #[tokio::test]
    async fn unmatched_route_is_404() {
        let pipeline = test_support::pipeline(vec![]);
        let resp = pipeline.handle(Request::test(Method::GET, "/missing")).await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stages_run_in_registration_order() {
        struct Tag(&'static str);

        impl Middleware for Tag {
            fn call(&self, req: Request, next: Next) -> MiddlewareFuture {
                let tag = self.0;
                Box::pin(async move {
                    let mut resp = next.run(req).await?;
                    // prepend so the outermost stage ends up first
                    let prior = resp
                        .headers()
                        .get("x-order")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_owned();
                    let combined = if prior.is_empty() { tag.to_owned() } else { format!("{tag},{prior}") };
                    resp.headers_mut()
                        .insert("x-order", combined.parse().expect("valid header"));
                    Ok(resp)
                })
            }
        }

        let pipeline = test_support::pipeline(vec![Arc::new(Tag("outer")), Arc::new(Tag("inner"))]);
        let resp = pipeline.handle(Request::test(Method::GET, "/ok")).await;
        assert_eq!(resp.headers().get("x-order").unwrap(), "outer,inner");
    }

    #[tokio::test]
    async fn escaped_error_becomes_500() {
        struct Failing;

        impl Middleware for Failing {
            fn call(&self, _req: Request, _next: Next) -> MiddlewareFuture {
                Box::pin(async { Err(Error::Host("broken stage".into())) })
            }
        }

        let pipeline = test_support::pipeline(vec![Arc::new(Failing)]);
        let resp = pipeline.handle(Request::test(Method::GET, "/ok")).await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
