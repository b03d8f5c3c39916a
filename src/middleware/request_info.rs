//! First pipeline stage: fills [`RequestInfo`] from well-known headers.

use std::time::Duration;

use http::HeaderName;

use crate::middleware::{Middleware, MiddlewareFuture, Next};
use crate::request::{Request, RequestInfo, RequestPriority};

/// Header names the request-info stage reads. Defaults follow the
/// platform's wire convention; override them only when fronted by a proxy
/// that renames headers.
#[derive(Clone, Debug)]
pub struct RequestInfoSettings {
    /// Remaining time budget, in fractional seconds.
    pub timeout_header: HeaderName,
    pub priority_header: HeaderName,
    pub client_application_header: HeaderName,
}

impl Default for RequestInfoSettings {
    fn default() -> Self {
        Self {
            timeout_header: HeaderName::from_static("request-timeout"),
            priority_header: HeaderName::from_static("request-priority"),
            client_application_header: HeaderName::from_static("client-application"),
        }
    }
}

pub(crate) struct FillRequestInfo {
    settings: RequestInfoSettings,
}

impl FillRequestInfo {
    pub(crate) fn new(settings: RequestInfoSettings) -> Self {
        Self { settings }
    }

    /// Malformed values degrade to defaults; a bad header is the client's
    /// problem, not grounds for rejecting the request.
    fn fill(&self, req: &Request) -> RequestInfo {
        let timeout = req
            .header(&self.settings.timeout_header)
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

        let priority = req
            .header(&self.settings.priority_header)
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(RequestPriority::Ordinary);

        let client_application = req
            .header(&self.settings.client_application_header)
            .map(str::to_owned);

        RequestInfo { timeout, priority, client_application, peer: req.peer() }
    }
}

impl Middleware for FillRequestInfo {
    fn call(&self, mut req: Request, next: Next) -> MiddlewareFuture {
        let info = self.fill(&req);
        req.extensions_mut().insert(info);
        next.run(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn fill(req: &Request) -> RequestInfo {
        FillRequestInfo::new(RequestInfoSettings::default()).fill(req)
    }

    #[test]
    fn parses_well_known_headers() {
        let req = Request::test(Method::GET, "/x")
            .with_header("request-timeout", "1.5")
            .with_header("request-priority", "Critical")
            .with_header("client-application", "infra.staging.caller.1");

        let info = fill(&req);
        assert_eq!(info.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(info.priority, RequestPriority::Critical);
        assert_eq!(info.client_application.as_deref(), Some("infra.staging.caller.1"));
    }

    #[test]
    fn malformed_values_degrade_to_defaults() {
        let req = Request::test(Method::GET, "/x")
            .with_header("request-timeout", "soon")
            .with_header("request-priority", "urgent");

        let info = fill(&req);
        assert_eq!(info.timeout, None);
        assert_eq!(info.priority, RequestPriority::Ordinary);
        assert_eq!(info.client_application, None);
    }

    #[test]
    fn negative_timeout_is_discarded() {
        let req = Request::test(Method::GET, "/x").with_header("request-timeout", "-2");
        assert_eq!(fill(&req).timeout, None);
    }
}
