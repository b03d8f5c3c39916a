//! Incoming HTTP request type and the per-request metadata the built-in
//! pipeline attaches to it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, Uri};
use http_body_util::BodyExt;
use uuid::Uuid;

// ── Request metadata ─────────────────────────────────────────────────────────

/// Client-declared request priority, used by shedding and throttling
/// layers downstream of this crate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestPriority {
    Critical,
    #[default]
    Ordinary,
    Sheddable,
}

impl FromStr for RequestPriority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("critical") {
            Ok(Self::Critical)
        } else if s.eq_ignore_ascii_case("ordinary") {
            Ok(Self::Ordinary)
        } else if s.eq_ignore_ascii_case("sheddable") {
            Ok(Self::Sheddable)
        } else {
            Err(())
        }
    }
}

/// Request metadata filled by the first pipeline stage: the client's
/// declared timeout budget and priority, who sent the request, and from
/// where.
#[derive(Clone, Debug)]
pub struct RequestInfo {
    /// Remaining time budget the client granted, from the timeout header.
    pub timeout: Option<Duration>,
    pub priority: RequestPriority,
    /// Identity of the calling application, from the client header.
    pub client_application: Option<String>,
    pub peer: SocketAddr,
}

/// Cross-service context restored from request headers: the trace id that
/// ties this request to its upstream call tree, plus any configured
/// pass-through properties.
#[derive(Clone, Debug)]
pub struct DistributedContext {
    pub trace_id: Uuid,
    pub properties: HashMap<String, String>,
}

// ── Request ─────────────────────────────────────────────────────────────────

/// An incoming HTTP request with its body fully buffered.
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    extensions: Extensions,
    peer: SocketAddr,
}

/// Why a request body could not be buffered.
pub(crate) enum BodyError {
    /// Larger than the configured `max_request_body_size`.
    TooLarge,
    /// The connection failed mid-body.
    Read,
}

impl Request {
    /// Buffers a hyper request into the pipeline's request type, enforcing
    /// the configured body-size limit both up front (`Content-Length`) and
    /// while reading (chunked bodies carry no length).
    pub(crate) async fn from_hyper(
        req: hyper::Request<hyper::body::Incoming>,
        peer: SocketAddr,
        body_limit: Option<u64>,
    ) -> Result<Self, BodyError> {
        let (parts, body) = req.into_parts();

        if let (Some(limit), Some(len)) = (body_limit, content_length(&parts.headers)) {
            if len > limit {
                return Err(BodyError::TooLarge);
            }
        }

        let body = match body_limit {
            Some(limit) => {
                let limited = http_body_util::Limited::new(body, limit as usize);
                match limited.collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(e) if e.is::<http_body_util::LengthLimitError>() => {
                        return Err(BodyError::TooLarge);
                    }
                    Err(_) => return Err(BodyError::Read),
                }
            }
            None => body.collect().await.map_err(|_| BodyError::Read)?.to_bytes(),
        };

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            extensions: parts.extensions,
            peer,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as UTF-8, if present and valid.
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns
    /// `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Metadata filled by the request-info stage. `None` only when the
    /// request never passed through the built-in pipeline.
    pub fn info(&self) -> Option<&RequestInfo> {
        self.extensions.get()
    }

    /// Context restored by the distributed-context stage.
    pub fn distributed_context(&self) -> Option<&DistributedContext> {
        self.extensions.get()
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// Bare request for pipeline unit tests.
    #[cfg(test)]
    pub(crate) fn test(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.parse().expect("invalid test uri"),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            extensions: Extensions::new(),
            peer: "127.0.0.1:9999".parse().expect("invalid test peer"),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.insert(
            http::HeaderName::from_static(name),
            value.parse().expect("invalid test header value"),
        );
        self
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(http::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parses_case_insensitively() {
        assert_eq!("CRITICAL".parse::<RequestPriority>(), Ok(RequestPriority::Critical));
        assert_eq!("sheddable".parse::<RequestPriority>(), Ok(RequestPriority::Sheddable));
        assert_eq!("Ordinary".parse::<RequestPriority>(), Ok(RequestPriority::Ordinary));
        assert!("urgent".parse::<RequestPriority>().is_err());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = Request::test(Method::GET, "/x").with_header("request-timeout", "1.5");
        assert_eq!(req.header("Request-Timeout"), Some("1.5"));
        assert_eq!(req.header("absent"), None);
    }
}
