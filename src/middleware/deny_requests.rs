//! Datacenter admission gate.
//!
//! When a datacenter is drained (failover, maintenance), its instances
//! keep running but must stop taking traffic. With the gate enabled,
//! requests arriving while the local datacenter is inactive are rejected
//! with a configurable status code; load balancers treat the rejection as
//! a signal to route elsewhere.

use std::sync::Arc;

use http::StatusCode;

use crate::env::Datacenters;
use crate::middleware::{Middleware, MiddlewareFuture, Next};
use crate::request::Request;
use crate::response::Response;

#[derive(Clone, Debug)]
pub struct DenyRequestsSettings {
    pub(crate) enabled: bool,
    pub(crate) deny_response_code: StatusCode,
}

impl Default for DenyRequestsSettings {
    fn default() -> Self {
        Self { enabled: false, deny_response_code: StatusCode::SERVICE_UNAVAILABLE }
    }
}

impl DenyRequestsSettings {
    pub(crate) fn deny(&mut self, code: StatusCode) {
        self.enabled = true;
        self.deny_response_code = code;
    }

    pub(crate) fn allow(&mut self) {
        self.enabled = false;
    }
}

pub(crate) struct DenyRequests {
    settings: DenyRequestsSettings,
    datacenters: Arc<dyn Datacenters>,
}

impl DenyRequests {
    pub(crate) fn new(settings: DenyRequestsSettings, datacenters: Arc<dyn Datacenters>) -> Self {
        Self { settings, datacenters }
    }
}

impl Middleware for DenyRequests {
    fn call(&self, req: Request, next: Next) -> MiddlewareFuture {
        if self.settings.enabled && !self.datacenters.local_is_active() {
            let code = self.settings.deny_response_code;
            let datacenter = self.datacenters.local().unwrap_or("unknown").to_owned();
            return Box::pin(async move {
                tracing::warn!(%datacenter, "denying request: local datacenter is not active");
                Ok(Response::status(code))
            });
        }
        next.run(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::test_support::pipeline;
    use http::Method;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Toggle(AtomicBool);

    impl Datacenters for Toggle {
        fn local(&self) -> Option<&str> {
            Some("vm-east")
        }

        fn local_is_active(&self) -> bool {
            self.0.load(Ordering::Relaxed)
        }
    }

    fn gate(enabled: bool, active: bool) -> Vec<Arc<dyn Middleware>> {
        let mut settings = DenyRequestsSettings::default();
        if enabled {
            settings.deny(StatusCode::SERVICE_UNAVAILABLE);
        }
        vec![Arc::new(DenyRequests::new(settings, Arc::new(Toggle(AtomicBool::new(active)))))]
    }

    #[tokio::test]
    async fn denies_while_inactive() {
        let resp = pipeline(gate(true, false)).handle(Request::test(Method::GET, "/ok")).await;
        assert_eq!(resp.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn passes_while_active() {
        let resp = pipeline(gate(true, true)).handle(Request::test(Method::GET, "/ok")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn disabled_gate_never_denies() {
        let resp = pipeline(gate(false, false)).handle(Request::test(Method::GET, "/ok")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
    }
}
