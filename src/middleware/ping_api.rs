//! Built-in status endpoints.
//!
//! Deployment tooling asks two questions over plain HTTP:
//!
//! | Path | Question |
//! |---|---|
//! | `{base}/_status/ping` | Can this instance take traffic right now? |
//! | `{base}/_status/version` | Which build is this? |
//!
//! The ping answer follows the host lifecycle: `Warmup` until the
//! application's warmup completes, `Ok` while serving, `Stopping` once
//! shutdown begins. Service registries poll it before admitting the
//! instance to rotation.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use http::{Method, StatusCode};
use serde::Serialize;

use crate::middleware::{Middleware, MiddlewareFuture, Next};
use crate::request::Request;
use crate::response::Response;

/// What the ping endpoint currently reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PingStatus {
    Warmup,
    Ok,
    Stopping,
}

impl PingStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Warmup => "Warmup",
            Self::Ok => "Ok",
            Self::Stopping => "Stopping",
        }
    }
}

/// Shared, atomically updated ping status. The host flips it as the
/// lifecycle advances; the middleware only reads.
#[derive(Clone)]
pub(crate) struct StatusFlag(Arc<AtomicU8>);

impl StatusFlag {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(0)))
    }

    pub(crate) fn set(&self, status: PingStatus) {
        let raw = match status {
            PingStatus::Warmup => 0,
            PingStatus::Ok => 1,
            PingStatus::Stopping => 2,
        };
        self.0.store(raw, Ordering::Release);
    }

    pub(crate) fn get(&self) -> PingStatus {
        match self.0.load(Ordering::Acquire) {
            0 => PingStatus::Warmup,
            1 => PingStatus::Ok,
            _ => PingStatus::Stopping,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PingApiSettings {
    /// Reported by `{base}/_status/version`; the endpoint answers 404
    /// when unset.
    pub commit_hash: Option<String>,
}

#[derive(Serialize)]
struct PingPayload<'a> {
    #[serde(rename = "Status")]
    status: &'a str,
}

#[derive(Serialize)]
struct VersionPayload<'a> {
    #[serde(rename = "CommitHash")]
    commit_hash: &'a str,
}

pub(crate) struct PingApi {
    settings: PingApiSettings,
    status: StatusFlag,
    ping_path: String,
    version_path: String,
}

impl PingApi {
    pub(crate) fn new(settings: PingApiSettings, status: StatusFlag, base_path: &str) -> Self {
        Self {
            settings,
            status,
            ping_path: format!("{base_path}/_status/ping"),
            version_path: format!("{base_path}/_status/version"),
        }
    }

    fn ping(&self) -> Response {
        let payload = PingPayload { status: self.status.get().as_str() };
        Response::json(serde_json::to_vec(&payload).expect("payload of two static strings"))
    }

    fn version(&self) -> Response {
        match &self.settings.commit_hash {
            Some(hash) => {
                let payload = VersionPayload { commit_hash: hash };
                Response::json(serde_json::to_vec(&payload).expect("payload of two strings"))
            }
            None => Response::status(StatusCode::NOT_FOUND),
        }
    }
}

impl Middleware for PingApi {
    fn call(&self, req: Request, next: Next) -> MiddlewareFuture {
        if req.method() == Method::GET {
            if req.path() == self.ping_path {
                let resp = self.ping();
                return Box::pin(async move { Ok(resp) });
            }
            if req.path() == self.version_path {
                let resp = self.version();
                return Box::pin(async move { Ok(resp) });
            }
        }
        next.run(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::test_support::pipeline;
    use pretty_assertions::assert_eq;

    fn chain(settings: PingApiSettings, flag: &StatusFlag) -> Vec<Arc<dyn Middleware>> {
        vec![Arc::new(PingApi::new(settings, flag.clone(), ""))]
    }

    #[tokio::test]
    async fn ping_follows_the_flag() {
        let flag = StatusFlag::new();
        let pipeline = pipeline(chain(PingApiSettings::default(), &flag));

        let resp = pipeline.handle(Request::test(Method::GET, "/_status/ping")).await;
        assert_eq!(resp.body(), br#"{"Status":"Warmup"}"#);

        flag.set(PingStatus::Ok);
        let resp = pipeline.handle(Request::test(Method::GET, "/_status/ping")).await;
        assert_eq!(resp.body(), br#"{"Status":"Ok"}"#);

        flag.set(PingStatus::Stopping);
        let resp = pipeline.handle(Request::test(Method::GET, "/_status/ping")).await;
        assert_eq!(resp.body(), br#"{"Status":"Stopping"}"#);
    }

    #[tokio::test]
    async fn version_reports_commit_hash_or_404() {
        let flag = StatusFlag::new();

        let with_hash = PingApiSettings { commit_hash: Some("abc123".into()) };
        let resp = pipeline(chain(with_hash, &flag))
            .handle(Request::test(Method::GET, "/_status/version"))
            .await;
        assert_eq!(resp.body(), br#"{"CommitHash":"abc123"}"#);

        let resp = pipeline(chain(PingApiSettings::default(), &flag))
            .handle(Request::test(Method::GET, "/_status/version"))
            .await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_get_methods_fall_through() {
        let flag = StatusFlag::new();
        let resp = pipeline(chain(PingApiSettings::default(), &flag))
            .handle(Request::test(Method::POST, "/_status/ping"))
            .await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND); // router miss, not a ping answer
    }

    #[tokio::test]
    async fn respects_base_path() {
        let flag = StatusFlag::new();
        let chain: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(PingApi::new(PingApiSettings::default(), flag.clone(), "/api"))];
        let pipeline = pipeline(chain);

        let resp = pipeline.handle(Request::test(Method::GET, "/api/_status/ping")).await;
        assert_eq!(resp.body(), br#"{"Status":"Warmup"}"#);

        let resp = pipeline.handle(Request::test(Method::GET, "/_status/ping")).await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
    }
}
