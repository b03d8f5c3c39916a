//! The application builder.
//!
//! [`AppBuilder`] is the fluent surface an application configures itself
//! through in [`Application::setup`](crate::Application::setup): one
//! `setup_*` method per built-in pipeline stage, server customization,
//! user middlewares, and the router. [`build`](AppBuilder::build)
//! translates the hosting environment plus the accumulated setup into a
//! ready-to-start [`Host`].

use std::sync::Arc;

use http::StatusCode;

use crate::env::HostingEnvironment;
use crate::error::Error;
use crate::host::Host;
use crate::middleware::{
    DenyRequests, DenyRequestsSettings, DistributedContextSettings, FillRequestInfo, Middleware,
    PingApi, PingApiSettings, Pipeline, RequestInfoSettings, RequestLogging,
    RequestLoggingSettings, RequestTracing, RequestTracingSettings, RestoreDistributedContext,
    StatusFlag, UnhandledErrors, UnhandledErrorsSettings,
};
use crate::router::Router;
use crate::server::ServerSettings;

type ServerCustomization = Box<dyn FnOnce(&mut ServerSettings) + Send>;

/// Accumulates an application's configuration before the host is built.
#[derive(Default)]
pub struct AppBuilder {
    request_info: RequestInfoSettings,
    distributed_context: DistributedContextSettings,
    tracing: RequestTracingSettings,
    logging: RequestLoggingSettings,
    deny_requests: DenyRequestsSettings,
    ping: PingApiSettings,
    unhandled_errors: UnhandledErrorsSettings,
    server_customizations: Vec<ServerCustomization>,
    user_middlewares: Vec<Arc<dyn Middleware>>,
    router: Router,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Customizes which headers the request-info stage reads.
    pub fn setup_request_info(&mut self, setup: impl FnOnce(&mut RequestInfoSettings)) -> &mut Self {
        setup(&mut self.request_info);
        self
    }

    /// Customizes distributed-context restoration.
    pub fn setup_distributed_context(
        &mut self,
        setup: impl FnOnce(&mut DistributedContextSettings),
    ) -> &mut Self {
        setup(&mut self.distributed_context);
        self
    }

    /// Customizes the per-request tracing span.
    pub fn setup_tracing(&mut self, setup: impl FnOnce(&mut RequestTracingSettings)) -> &mut Self {
        setup(&mut self.tracing);
        self
    }

    /// Customizes request/response logging.
    pub fn setup_logging(&mut self, setup: impl FnOnce(&mut RequestLoggingSettings)) -> &mut Self {
        setup(&mut self.logging);
        self
    }

    /// Customizes the status endpoints.
    pub fn setup_ping(&mut self, setup: impl FnOnce(&mut PingApiSettings)) -> &mut Self {
        setup(&mut self.ping);
        self
    }

    /// Customizes error containment.
    pub fn setup_unhandled_errors(
        &mut self,
        setup: impl FnOnce(&mut UnhandledErrorsSettings),
    ) -> &mut Self {
        setup(&mut self.unhandled_errors);
        self
    }

    /// Rejects requests with `code` while the local datacenter is not
    /// active. Off unless called.
    pub fn deny_requests_outside_active_datacenter(&mut self, code: StatusCode) -> &mut Self {
        self.deny_requests.deny(code);
        self
    }

    /// Serves traffic regardless of datacenter state (the default).
    pub fn allow_requests_outside_active_datacenter(&mut self) -> &mut Self {
        self.deny_requests.allow();
        self
    }

    /// Customizes [`ServerSettings`] after config-source overrides are
    /// applied. The bind address is off limits — see [`build`](Self::build).
    pub fn setup_server(
        &mut self,
        setup: impl FnOnce(&mut ServerSettings) + Send + 'static,
    ) -> &mut Self {
        self.server_customizations.push(Box::new(setup));
        self
    }

    /// Appends a user middleware. User middlewares run after the built-in
    /// chain, inside error containment, in registration order.
    pub fn add_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.user_middlewares.push(Arc::new(middleware));
        self
    }

    /// Sets the application router — the pipeline's terminal stage.
    pub fn router(&mut self, router: Router) -> &mut Self {
        self.router = router;
        self
    }

    /// Translates the environment and the accumulated setup into a
    /// ready-to-start [`Host`].
    ///
    /// Fails with [`Error::BindingOverridden`] if a server customization
    /// changed the bind address: the service beacon owns the binding, and
    /// an address configured anywhere else would leave the beacon
    /// advertising a socket nobody listens on.
    pub fn build(self, env: &HostingEnvironment) -> Result<Host, Error> {
        let mut server = ServerSettings::from_config(env.beacon().addr(), env.config())?;

        let beacon_addr = server.bind_addr;
        for customize in self.server_customizations {
            customize(&mut server);
        }
        if server.bind_addr != beacon_addr {
            return Err(Error::BindingOverridden {
                beacon: beacon_addr,
                customized: server.bind_addr,
            });
        }

        let ping_status = StatusFlag::new();
        let base_path = env.beacon().base_path();

        let mut chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(FillRequestInfo::new(self.request_info)),
            Arc::new(RestoreDistributedContext::new(self.distributed_context)),
            Arc::new(RequestTracing::new(self.tracing)),
            Arc::new(RequestLogging::new(self.logging)),
            Arc::new(DenyRequests::new(self.deny_requests, Arc::clone(env.datacenters()))),
            Arc::new(PingApi::new(self.ping, ping_status.clone(), base_path)),
            Arc::new(UnhandledErrors::new(self.unhandled_errors)),
        ];
        chain.extend(self.user_middlewares);

        let pipeline = Pipeline::new(chain, self.router, base_path.to_owned());
        Ok(Host::new(server, pipeline, env.shutdown_token(), ping_status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ApplicationIdentity, ServiceBeacon};
    use crate::lifecycle::HostState;
    use std::collections::HashMap;
    use std::time::Duration;

    fn env_with_config(pairs: &[(&str, &str)]) -> HostingEnvironment {
        let config = crate::ConfigSource::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        );
        HostingEnvironment::builder()
            .identity(ApplicationIdentity::new("infra", "test", "gateway", "1"))
            .beacon(ServiceBeacon::new("127.0.0.1:0".parse().unwrap()))
            .config(config)
            .build()
            .unwrap()
    }

    #[test]
    fn build_produces_a_not_started_host() {
        let env = env_with_config(&[]);
        let host = AppBuilder::new().build(&env).unwrap();
        assert_eq!(host.lifetime().state(), HostState::NotStarted);
        assert_eq!(host.local_addr(), None);
    }

    #[test]
    fn customizations_stack_on_config_overrides() {
        let env = env_with_config(&[("server.shutdown-timeout-secs", "5")]);

        let mut builder = AppBuilder::new();
        builder.setup_server(|s| s.keep_alive = false);
        // settings are observable only through the host, so assert via a
        // second customization that sees the accumulated state
        builder.setup_server(|s| {
            assert_eq!(s.shutdown_timeout, Duration::from_secs(5));
            assert!(!s.keep_alive);
        });
        builder.build(&env).unwrap();
    }

    #[test]
    fn changing_the_binding_is_rejected() {
        let env = env_with_config(&[]);

        let mut builder = AppBuilder::new();
        builder.setup_server(|s| s.bind_addr = "0.0.0.0:9999".parse().unwrap());

        let err = builder.build(&env).unwrap_err();
        assert!(matches!(err, Error::BindingOverridden { .. }));
    }

    #[test]
    fn malformed_server_config_fails_the_build() {
        let env = env_with_config(&[("server.max-request-body-size", "lots")]);
        assert!(matches!(AppBuilder::new().build(&env), Err(Error::Config { .. })));
    }
}
