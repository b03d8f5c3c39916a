//! Containment: the last stage before application code.
//!
//! Catches whatever escapes user middlewares and handlers — `Err` returns
//! and panics alike — logs it, and serves a bare error response instead of
//! letting the failure tear down the connection. A canceled request is
//! downgraded to a `warn`: it almost always means the client closed the
//! connection, which is their prerogative, not a server fault.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use http::StatusCode;

use crate::middleware::{Middleware, MiddlewareFuture, Next};
use crate::request::Request;
use crate::response::Response;

#[derive(Clone, Debug)]
pub struct UnhandledErrorsSettings {
    /// Status served when application code fails.
    pub error_response_code: StatusCode,
}

impl Default for UnhandledErrorsSettings {
    fn default() -> Self {
        Self { error_response_code: StatusCode::INTERNAL_SERVER_ERROR }
    }
}

pub(crate) struct UnhandledErrors {
    settings: UnhandledErrorsSettings,
}

impl UnhandledErrors {
    pub(crate) fn new(settings: UnhandledErrorsSettings) -> Self {
        Self { settings }
    }
}

impl Middleware for UnhandledErrors {
    fn call(&self, req: Request, next: Next) -> MiddlewareFuture {
        let code = self.settings.error_response_code;
        Box::pin(async move {
            match AssertUnwindSafe(next.run(req)).catch_unwind().await {
                Ok(Ok(resp)) => Ok(resp),
                Ok(Err(error)) if error.is_canceled() => {
                    tracing::warn!(
                        "request has been canceled, likely a connection close from the client side"
                    );
                    Ok(Response::status(code))
                }
                Ok(Err(error)) => {
                    tracing::error!(%error, "an unhandled error occurred during request processing");
                    Ok(Response::status(code))
                }
                Err(panic) => {
                    tracing::error!(
                        panic = panic_message(&panic),
                        "a panic occurred during request processing"
                    );
                    Ok(Response::status(code))
                }
            }
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::middleware::test_support::pipeline;
    use http::Method;
    use std::sync::Arc;

    struct Failing(fn() -> Error);

    impl Middleware for Failing {
        fn call(&self, _req: Request, _next: Next) -> MiddlewareFuture {
            let make = self.0;
            Box::pin(async move { Err(make()) })
        }
    }

    struct Panicking;

    impl Middleware for Panicking {
        fn call(&self, _req: Request, _next: Next) -> MiddlewareFuture {
            Box::pin(async {
                let result: Result<Response, Error> = panic!("handler exploded");
                result
            })
        }
    }

    fn contained(inner: Arc<dyn Middleware>, code: StatusCode) -> Vec<Arc<dyn Middleware>> {
        let settings = UnhandledErrorsSettings { error_response_code: code };
        vec![Arc::new(UnhandledErrors::new(settings)), inner]
    }

    #[tokio::test]
    async fn errors_become_the_configured_response() {
        let chain = contained(
            Arc::new(Failing(|| Error::Host("boom".into()))),
            StatusCode::BAD_GATEWAY,
        );
        let resp = pipeline(chain).handle(Request::test(Method::GET, "/ok")).await;
        assert_eq!(resp.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn cancellation_is_contained_too() {
        let chain = contained(Arc::new(Failing(|| Error::Canceled)), StatusCode::INTERNAL_SERVER_ERROR);
        let resp = pipeline(chain).handle(Request::test(Method::GET, "/ok")).await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let chain = contained(Arc::new(Panicking), StatusCode::INTERNAL_SERVER_ERROR);
        let resp = pipeline(chain).handle(Request::test(Method::GET, "/ok")).await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn success_passes_untouched() {
        let settings = UnhandledErrorsSettings::default();
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(UnhandledErrors::new(settings))];
        let resp = pipeline(chain).handle(Request::test(Method::GET, "/ok")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), b"ok");
    }
}
