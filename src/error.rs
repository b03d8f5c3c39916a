//! Unified error type.

use std::net::SocketAddr;

use thiserror::Error;

/// The error type returned by berth's fallible operations.
///
/// Application-level failures (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// hosting failures: bad configuration, a binding conflict, the listener
/// refusing to bind, a middleware giving up on a request.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration source held a value the settings translation could
    /// not parse.
    #[error("invalid configuration value for `{key}`: {message}")]
    Config { key: String, message: String },

    /// The environment builder was finalized without a required component.
    #[error("hosting environment is missing {0}")]
    MissingEnvironmentComponent(&'static str),

    /// A server customization changed the bind address. The service beacon
    /// owns the binding: configure the address on the hosting environment's
    /// beacon, never through [`ServerSettings`](crate::ServerSettings).
    #[error(
        "the service beacon owns the binding: configure the address on the \
         hosting environment's beacon (beacon: {beacon}, customized: {customized})"
    )]
    BindingOverridden {
        beacon: SocketAddr,
        customized: SocketAddr,
    },

    /// A global `tracing` subscriber was already installed.
    #[error("a global tracing subscriber is already set")]
    LoggingInit,

    /// [`Host::start`](crate::Host::start) was called twice.
    #[error("host has already been started")]
    AlreadyStarted,

    /// The request was abandoned mid-flight, usually because the client
    /// closed the connection. The containment middleware logs this at
    /// `warn` rather than `error`.
    #[error("request was canceled")]
    Canceled,

    /// The serve loop died in a way that is not attributable to a request.
    #[error("host failure: {0}")]
    Host(String),

    /// An application-supplied stage (warmup, a user middleware) failed.
    #[error(transparent)]
    Application(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an application-level error for propagation through the
    /// pipeline or out of [`run`](crate::run).
    pub fn application(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Application(err.into())
    }

    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Self::Config { key: key.to_owned(), message: message.into() }
    }

    /// True for errors the containment middleware treats as a client
    /// disconnect rather than a server fault.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}
