//! Profile service configuration.

use std::env;

use common::{CouchConfig, DecodeFailurePolicy};

/// Profile service configuration.
#[derive(Debug, Clone, Default)]
pub struct ProfileServiceConfig {
    /// CouchDB connection settings
    pub couch: CouchConfig,
    /// How undecodable documents are surfaced
    pub decode_policy: DecodeFailurePolicy,
}

impl ProfileServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source; unset or
    /// unparsable values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CouchConfig::default();

        let decode_policy = match lookup("PROFILE_DECODE_POLICY") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("{}, using the default policy", e);
                DecodeFailurePolicy::default()
            }),
            None => DecodeFailurePolicy::default(),
        };

        Self {
            couch: CouchConfig {
                url: lookup("COUCH_URL").unwrap_or(defaults.url),
                database: lookup("COUCH_DATABASE").unwrap_or(defaults.database),
                username: lookup("COUCH_USERNAME").filter(|u| !u.is_empty()),
                password: lookup("COUCH_PASSWORD"),
                timeout_ms: lookup("COUCH_TIMEOUT_MS")
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(defaults.timeout_ms),
            },
            decode_policy,
        }
    }
}
