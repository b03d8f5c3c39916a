//! Per-request tracing span.
//!
//! Wraps everything downstream in an `http-request` span so log events
//! from later stages and handlers carry the request's method, path, and
//! trace id. The response status is recorded when the request completes.

use tracing::Instrument;

use crate::middleware::{Middleware, MiddlewareFuture, Next};
use crate::request::Request;

#[derive(Clone, Debug, Default)]
pub struct RequestTracingSettings {
    /// Record the raw query string on the span. Off by default: query
    /// strings routinely carry tokens and user identifiers.
    pub record_query_string: bool,
}

pub(crate) struct RequestTracing {
    settings: RequestTracingSettings,
}

impl RequestTracing {
    pub(crate) fn new(settings: RequestTracingSettings) -> Self {
        Self { settings }
    }
}

impl Middleware for RequestTracing {
    fn call(&self, req: Request, next: Next) -> MiddlewareFuture {
        let trace_id = req
            .distributed_context()
            .map(|ctx| ctx.trace_id.to_string())
            .unwrap_or_default();

        let span = tracing::info_span!(
            "http-request",
            method = %req.method(),
            path = %req.path(),
            query = self.settings.record_query_string.then(|| req.query()).flatten(),
            %trace_id,
            status = tracing::field::Empty,
        );

        Box::pin(
            async move {
                let resp = next.run(req).await?;
                tracing::Span::current().record("status", resp.status_code().as_u16());
                Ok(resp)
            }
            .instrument(span),
        )
    }
}
