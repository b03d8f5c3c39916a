//! Request/response logging.
//!
//! One `info` event when a request is received, one when it completes.
//! Header logging is whitelist-only: the operator names the headers worth
//! keeping, everything else stays out of the logs.

use std::time::Instant;

use http::{HeaderMap, HeaderName};

use crate::middleware::{Middleware, MiddlewareFuture, Next};
use crate::request::Request;

#[derive(Clone, Debug, Default)]
pub struct RequestLoggingSettings {
    pub log_query_string: bool,
    /// Request headers to include in the receipt event.
    pub log_request_headers: Vec<HeaderName>,
    /// Response headers to include in the completion event.
    pub log_response_headers: Vec<HeaderName>,
}

pub(crate) struct RequestLogging {
    settings: RequestLoggingSettings,
}

impl RequestLogging {
    pub(crate) fn new(settings: RequestLoggingSettings) -> Self {
        Self { settings }
    }
}

impl Middleware for RequestLogging {
    fn call(&self, req: Request, next: Next) -> MiddlewareFuture {
        let method = req.method().clone();
        let path = req.path().to_owned();
        let query = self
            .settings
            .log_query_string
            .then(|| req.query().map(str::to_owned))
            .flatten();
        let client_application = req
            .info()
            .and_then(|info| info.client_application.clone());
        let request_headers = render_headers(req.headers(), &self.settings.log_request_headers);
        let response_whitelist = self.settings.log_response_headers.clone();

        tracing::info!(
            %method,
            %path,
            query,
            client_application,
            headers = request_headers,
            "received request"
        );

        let started = Instant::now();
        Box::pin(async move {
            let resp = next.run(req).await?;
            tracing::info!(
                %method,
                %path,
                status = resp.status_code().as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                body_size = resp.body().len(),
                headers = render_headers(resp.headers(), &response_whitelist),
                "request completed"
            );
            Ok(resp)
        })
    }
}

/// `name=value; name=value` for the whitelisted headers present, `None`
/// when nothing matched (keeps the field out of the event entirely).
fn render_headers(headers: &HeaderMap, whitelist: &[HeaderName]) -> Option<String> {
    let rendered: Vec<String> = whitelist
        .iter()
        .filter_map(|name| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| format!("{name}={v}"))
        })
        .collect();
    (!rendered.is_empty()).then(|| rendered.join("; "))
}
