//! Configuration sources.
//!
//! A hosting environment carries one [`ConfigSource`]: a string-keyed view
//! over wherever the deployment keeps its knobs — process environment
//! variables, a parsed JSON document, a literal map, or layers of all
//! three. The server-settings translation reads `server.*` keys from it
//! (see [`ServerSettings::from_config`](crate::ServerSettings::from_config));
//! applications are free to read their own keys through the same API.
//!
//! Keys are dotted, lowercase, dash-separated: `server.keep-alive`,
//! `server.shutdown-timeout-secs`.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::Error;

/// A read-only, string-keyed configuration source.
#[derive(Clone, Debug, Default)]
pub enum ConfigSource {
    /// No configuration; every lookup misses.
    #[default]
    Empty,

    /// A literal key-value map. Handy in tests and demos.
    Map(HashMap<String, String>),

    /// Process environment variables. A dotted key is translated by
    /// prefixing, replacing `.` and `-` with `_`, and uppercasing:
    /// with prefix `"APP_"`, `server.keep-alive` reads `APP_SERVER_KEEP_ALIVE`.
    Env { prefix: String },

    /// A parsed JSON document. Dotted keys walk nested objects; scalar
    /// leaves (strings, numbers, booleans) are stringified.
    Json(serde_json::Value),

    /// A stack of sources. Later layers win.
    Layered(Vec<ConfigSource>),
}

impl ConfigSource {
    /// Looks up a dotted key, returning the raw string value.
    pub fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Map(map) => map.get(key).cloned(),
            Self::Env { prefix } => {
                let var = format!("{prefix}{}", key.replace(['.', '-'], "_")).to_uppercase();
                std::env::var(var).ok()
            }
            Self::Json(value) => {
                let leaf = key.split('.').try_fold(value, |v, seg| v.get(seg))?;
                match leaf {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    serde_json::Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                }
            }
            Self::Layered(layers) => layers.iter().rev().find_map(|l| l.get(key)),
        }
    }

    /// Looks up `key` and parses it as an unsigned integer.
    ///
    /// A missing key is `Ok(None)`; a present-but-malformed value is an
    /// [`Error::Config`].
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, Error> {
        self.get(key)
            .map(|raw| raw.parse().map_err(|_| Error::config(key, format!("`{raw}` is not an unsigned integer"))))
            .transpose()
    }

    /// Looks up `key` and parses it as a boolean (`true` / `false`).
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, Error> {
        self.get(key)
            .map(|raw| raw.parse().map_err(|_| Error::config(key, format!("`{raw}` is not a boolean"))))
            .transpose()
    }

    /// Looks up `key` as a whole number of seconds.
    pub fn get_duration_secs(&self, key: &str) -> Result<Option<Duration>, Error> {
        Ok(self.get_u64(key)?.map(Duration::from_secs))
    }
}
