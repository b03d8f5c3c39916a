//! Logging bridge.
//!
//! Translates the environment's [`LogSettings`] into a process-wide
//! `tracing` subscriber. The host never logs through anything else; an
//! application that already installed its own subscriber can simply skip
//! [`init`].

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::env::HostingEnvironment;
use crate::error::Error;

/// Output format for the bridged subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-oriented single-line text.
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

/// Logging configuration carried by the hosting environment.
#[derive(Clone, Debug)]
pub struct LogSettings {
    /// An `EnvFilter` directive string, e.g. `"info"` or
    /// `"info,berth=debug"`. `RUST_LOG` in the process environment takes
    /// precedence when set.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { filter: "info".into(), format: LogFormat::Text }
    }
}

/// Installs the environment's log settings as the global subscriber.
///
/// Errors with [`Error::LoggingInit`] if a global subscriber is already
/// set.
pub fn init(env: &HostingEnvironment) -> Result<(), Error> {
    let settings = env.log_settings();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.filter));

    let registry = tracing_subscriber::registry().with(filter);
    match settings.format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|_| Error::LoggingInit)?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|_| Error::LoggingInit)?,
    }

    tracing::info!(identity = %env.identity(), "logging initialized");
    Ok(())
}
