//! Provider configuration
//!
//! Read from the configuration file's `provider` block, or from the
//! environment:
//!
//! | variable | default |
//! |---|---|
//! | `RS_HOST` | `us-3.rightscale.com` |
//! | `RS_REFRESH_TOKEN` | required |
//! | `RS_ACCOUNT_ID` | required |
//! | `RS_TIMEOUT` | `30` (seconds) |

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "us-3.rightscale.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors in the provider configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection settings for the Cloud Management API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    /// API host name, optionally with a scheme
    #[serde(default = "default_host")]
    pub host: String,
    /// OAuth refresh token of the API user
    pub refresh_token: String,
    /// Account all requests are scoped to
    pub account_id: u64,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ProviderConfig {
    pub fn new(refresh_token: impl Into<String>, account_id: u64) -> Self {
        Self {
            host: default_host(),
            refresh_token: refresh_token.into(),
            account_id,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Load the configuration from `RS_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let refresh_token =
            non_empty("RS_REFRESH_TOKEN").ok_or(ConfigError::Missing("RS_REFRESH_TOKEN"))?;
        let account_id = non_empty("RS_ACCOUNT_ID").ok_or(ConfigError::Missing("RS_ACCOUNT_ID"))?;
        let account_id = parse_number("RS_ACCOUNT_ID", &account_id)?;

        let mut config = Self::new(refresh_token, account_id);
        if let Some(host) = non_empty("RS_HOST") {
            config.host = host;
        }
        if let Some(timeout) = non_empty("RS_TIMEOUT") {
            config.timeout_secs = parse_number("RS_TIMEOUT", &timeout)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check settings that deserialization cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_token.trim().is_empty() {
            return Err(ConfigError::Missing("refresh_token"));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("host"));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "timeout_secs",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Base URL of the API, defaulting to https when the host has no scheme
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        }
    }
}

fn parse_number(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
