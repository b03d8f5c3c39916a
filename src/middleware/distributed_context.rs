//! Restores cross-service context from request headers.
//!
//! The trace id ties a request to its upstream call tree. When the caller
//! sent none (or a malformed one) a fresh id is generated, so every
//! request downstream of this stage has exactly one. The id is echoed on
//! the response so callers can correlate without parsing logs.

use std::collections::HashMap;

use http::{HeaderName, HeaderValue};
use uuid::Uuid;

use crate::middleware::{Middleware, MiddlewareFuture, Next};
use crate::request::{DistributedContext, Request};

#[derive(Clone, Debug)]
pub struct DistributedContextSettings {
    pub trace_id_header: HeaderName,
    /// Additional headers whose values are carried in
    /// [`DistributedContext::properties`], keyed by header name.
    pub additional_headers: Vec<HeaderName>,
}

impl Default for DistributedContextSettings {
    fn default() -> Self {
        Self {
            trace_id_header: HeaderName::from_static("trace-id"),
            additional_headers: Vec::new(),
        }
    }
}

pub(crate) struct RestoreDistributedContext {
    settings: DistributedContextSettings,
}

impl RestoreDistributedContext {
    pub(crate) fn new(settings: DistributedContextSettings) -> Self {
        Self { settings }
    }

    fn restore(&self, req: &Request) -> DistributedContext {
        let trace_id = req
            .header(&self.settings.trace_id_header)
            .and_then(|raw| Uuid::try_parse(raw.trim()).ok())
            .unwrap_or_else(Uuid::new_v4);

        let properties: HashMap<String, String> = self
            .settings
            .additional_headers
            .iter()
            .filter_map(|name| {
                req.header(name).map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect();

        DistributedContext { trace_id, properties }
    }
}

impl Middleware for RestoreDistributedContext {
    fn call(&self, mut req: Request, next: Next) -> MiddlewareFuture {
        let context = self.restore(&req);
        let trace_id = context.trace_id;
        let header = self.settings.trace_id_header.clone();
        req.extensions_mut().insert(context);

        Box::pin(async move {
            let mut resp = next.run(req).await?;
            let value = HeaderValue::from_str(&trace_id.to_string())
                .expect("uuid is always a valid header value");
            resp.headers_mut().insert(header, value);
            Ok(resp)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::test_support::pipeline;
    use http::Method;
    use std::sync::Arc;

    #[test]
    fn restores_incoming_trace_id() {
        let id = Uuid::new_v4();
        let req = Request::test(Method::GET, "/x").with_header("trace-id", &id.to_string());
        let mw = RestoreDistributedContext::new(DistributedContextSettings::default());
        assert_eq!(mw.restore(&req).trace_id, id);
    }

    #[test]
    fn generates_when_absent_or_malformed() {
        let mw = RestoreDistributedContext::new(DistributedContextSettings::default());

        let absent = Request::test(Method::GET, "/x");
        let malformed = Request::test(Method::GET, "/x").with_header("trace-id", "not-a-uuid");
        assert_ne!(mw.restore(&absent).trace_id, mw.restore(&malformed).trace_id);
    }

    #[test]
    fn carries_configured_properties() {
        let settings = DistributedContextSettings {
            additional_headers: vec![HeaderName::from_static("tenant")],
            ..Default::default()
        };
        let req = Request::test(Method::GET, "/x").with_header("tenant", "acme");
        let context = RestoreDistributedContext::new(settings).restore(&req);
        assert_eq!(context.properties.get("tenant").map(String::as_str), Some("acme"));
    }

    #[tokio::test]
    async fn echoes_trace_id_on_response() {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(RestoreDistributedContext::new(
            DistributedContextSettings::default(),
        ))];
        let id = Uuid::new_v4();
        let req = Request::test(Method::GET, "/ok").with_header("trace-id", &id.to_string());

        let resp = pipeline(chain).handle(req).await;
        assert_eq!(resp.headers().get("trace-id").unwrap(), id.to_string().as_str());
    }
}
