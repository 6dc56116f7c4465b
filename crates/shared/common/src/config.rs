//! Shared configuration structures.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// CouchDB connection configuration.
#[derive(Clone, Deserialize, Serialize)]
pub struct CouchConfig {
    /// Server base URL (e.g., "http://127.0.0.1:5984")
    pub url: String,
    /// Database holding the profile documents
    pub database: String,
    /// Basic-auth user, if the server requires one
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl fmt::Debug for CouchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl Default for CouchConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5984".to_string(),
            database: "profiles".to_string(),
            username: None,
            password: None,
            timeout_ms: 30000,
        }
    }
}

/// What to do when a stored document cannot be decoded during
/// update, delete or read-by-id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeFailurePolicy {
    /// Log the failure and carry on as a no-op (or an empty result)
    #[default]
    Absorb,
    /// Return the failure to the caller
    Report,
}

impl FromStr for DecodeFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "absorb" => Ok(DecodeFailurePolicy::Absorb),
            "report" => Ok(DecodeFailurePolicy::Report),
            other => Err(format!("unknown decode failure policy: {}", other)),
        }
    }
}
