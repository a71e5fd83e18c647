//! Server configuration from the environment.
//!
//! All knobs live under the `AEGIS_` prefix. The vault root key is the
//! only required variable: without it the service cannot encrypt
//! mappings, so startup fails rather than falling back to an ephemeral
//! key that would silently break multi-replica deployments.

use std::net::SocketAddr;
use std::time::Duration;

use aegis_core::RootKey;
use thiserror::Error;

/// Bind address variable.
pub const ENV_BIND: &str = "AEGIS_BIND";
/// TTL variable.
pub const ENV_TTL_SECONDS: &str = "AEGIS_VAULT_TTL_SECONDS";
/// Capacity variable.
pub const ENV_MAX_SESSIONS: &str = "AEGIS_VAULT_MAX_SESSIONS";
/// Root key variable (required).
pub const ENV_ROOT_KEY: &str = "AEGIS_VAULT_ROOT_KEY";
/// Model name variable.
pub const ENV_MODEL_NAME: &str = "AEGIS_MODEL_NAME";
/// Language variable.
pub const ENV_LANGUAGE: &str = "AEGIS_LANGUAGE";

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_MODEL_NAME: &str = "lexicon-en-v1";
const DEFAULT_LANGUAGE: &str = "en";

/// Errors raised while reading the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The required root key variable is absent.
    #[error("{ENV_ROOT_KEY} is required: the vault cannot encrypt without a root key")]
    MissingRootKey,

    /// A variable was present but unusable.
    #[error("invalid {var}: {reason}")]
    Invalid {
        /// The offending variable.
        var: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Resolved server configuration.
pub struct ServerConfig {
    /// Listen address.
    pub bind: SocketAddr,

    /// Session time-to-live.
    pub ttl: Duration,

    /// Maximum live sessions.
    pub max_sessions: usize,

    /// Vault root key.
    pub root_key: RootKey,

    /// NER model identifier.
    pub model_name: String,

    /// Default recognition language.
    pub language: String,
}

impl ServerConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the root key is missing or any variable
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let root_key_value = std::env::var(ENV_ROOT_KEY).map_err(|_| ConfigError::MissingRootKey)?;
        let root_key = RootKey::parse(&root_key_value).map_err(|e| ConfigError::Invalid {
            var: ENV_ROOT_KEY,
            reason: e.to_string(),
        })?;

        let bind = optional(ENV_BIND)
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .map_err(|e| ConfigError::Invalid {
                var: ENV_BIND,
                reason: format!("{e}"),
            })?;

        let ttl = match optional(ENV_TTL_SECONDS) {
            None => aegis_core::vault::DEFAULT_TTL,
            Some(raw) => Duration::from_secs(parse_positive(ENV_TTL_SECONDS, &raw)?),
        };

        let max_sessions = match optional(ENV_MAX_SESSIONS) {
            None => aegis_core::vault::DEFAULT_MAX_SESSIONS,
            Some(raw) => usize::try_from(parse_positive(ENV_MAX_SESSIONS, &raw)?).map_err(|e| {
                ConfigError::Invalid {
                    var: ENV_MAX_SESSIONS,
                    reason: e.to_string(),
                }
            })?,
        };

        Ok(Self {
            bind,
            ttl,
            max_sessions,
            root_key,
            model_name: optional(ENV_MODEL_NAME)
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            language: optional(ENV_LANGUAGE).unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        })
    }
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let value: u64 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
        var,
        reason: format!("{e}"),
    })?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            reason: "must be positive".to_string(),
        });
    }
    Ok(value)
}
