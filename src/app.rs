//! The application contract and the runner that drives it.

use async_trait::async_trait;
use tracing::error;

use crate::builder::AppBuilder;
use crate::env::HostingEnvironment;
use crate::error::Error;

/// What an application implements to be hosted.
///
/// Both hooks default to no-ops: the smallest application is an empty
/// struct plus a router.
///
/// ```rust,no_run
/// use berth::{AppBuilder, Application, HostingEnvironment, Request, Response, Router};
///
/// struct Api;
///
/// impl Application for Api {
///     fn setup(&self, builder: &mut AppBuilder, _env: &HostingEnvironment) {
///         builder.router(Router::new().get("/users/{id}", get_user));
///     }
/// }
///
/// async fn get_user(req: Request) -> Response {
///     let id = req.param("id").unwrap_or("unknown");
///     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
/// }
/// ```
#[async_trait]
pub trait Application: Send + Sync {
    /// Configure middlewares, server settings, and routes. Called once,
    /// before anything binds.
    fn setup(&self, builder: &mut AppBuilder, env: &HostingEnvironment) {
        let _ = (builder, env);
    }

    /// Initialization that must finish before the instance reports `Ok` on
    /// the status endpoint: cache priming, connection pools, migrations.
    /// The host is already serving (status: `Warmup`) while this runs.
    async fn warmup(&self, env: &HostingEnvironment) -> Result<(), Error> {
        let _ = env;
        Ok(())
    }
}

/// Hosts `app` against `env` until the shutdown signal completes a
/// graceful stop.
///
/// The sequence: `setup` → build → bind and start serving (status
/// endpoint answers `Warmup`) → `warmup` → status flips to `Ok` → block
/// until the shutdown token triggers and draining finishes.
///
/// A warmup failure stops the host gracefully and returns the error.
pub async fn run(app: impl Application, env: HostingEnvironment) -> Result<(), Error> {
    let mut builder = AppBuilder::new();
    app.setup(&mut builder, &env);

    let mut host = builder.build(&env)?;
    host.start().await?;

    match app.warmup(&env).await {
        Ok(()) => host.mark_ready(),
        Err(warmup_error) => {
            error!(error = %warmup_error, "warmup failed, stopping host");
            host.stop();
            host.wait_until_stopped().await?;
            return Err(warmup_error);
        }
    }

    host.wait_until_stopped().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ApplicationIdentity, ServiceBeacon};
    use tokio_util::sync::CancellationToken;

    fn env(token: &CancellationToken) -> HostingEnvironment {
        HostingEnvironment::builder()
            .identity(ApplicationIdentity::new("infra", "test", "gateway", "1"))
            .beacon(ServiceBeacon::new("127.0.0.1:0".parse().unwrap()))
            .shutdown_token(token.clone())
            .build()
            .unwrap()
    }

    struct Noop;

    impl Application for Noop {}

    struct FailingWarmup;

    #[async_trait]
    impl Application for FailingWarmup {
        async fn warmup(&self, _env: &HostingEnvironment) -> Result<(), Error> {
            Err(Error::application("cache refused to prime"))
        }
    }

    #[tokio::test]
    async fn run_returns_after_token_cancellation() {
        let token = CancellationToken::new();
        let env = env(&token);

        let runner = tokio::spawn(run(Noop, env));
        token.cancel();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn warmup_failure_stops_the_host_and_propagates() {
        let token = CancellationToken::new();
        let err = run(FailingWarmup, env(&token)).await.unwrap_err();
        assert!(matches!(err, Error::Application(_)));
    }
}
