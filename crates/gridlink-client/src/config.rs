//! Client configuration, fixed at construction time.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Immutable client configuration, constructed once before the client.
///
/// Replaces the original runtime-mutable settings object: everything here is
/// fixed for the client's lifetime; the only mutable per-client state is the
/// session slot owned by the session manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the remote service, e.g. `http://127.0.0.1:8886`.
    pub base_url: String,
    /// Per-request timeout applied by the HTTP transport, in seconds.
    pub request_timeout_secs: u64,
    /// Polling behaviour for subscriptions.
    pub subscription_polling: PollingConfig,
    /// Names of service lists this client expects to have registered.
    pub service_lists: Vec<String>,
    /// Credentials to log in with as soon as the client connects.
    pub auto_login: Option<Credentials>,
}

/// Subscription polling knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Whether subscriptions poll at all. When disabled, `start` delivers
    /// no updates and only cancellation is observable.
    pub enabled: bool,
    /// Delay between poll cycles, in milliseconds. Must be positive.
    pub period_ms: u64,
}

/// Login credentials for auto-login at connect time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// User name.
    pub name: String,
    /// Password.
    pub password: String,
}

impl Default for PollingConfig {
    fn default() -> Self {
        // Do not poll more often than once a second against production
        // services; tests override this freely.
        Self {
            enabled: true,
            period_ms: 1000,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("http://127.0.0.1:8886"),
            request_timeout_secs: 30,
            subscription_polling: PollingConfig::default(),
            service_lists: Vec::new(),
            auto_login: None,
        }
    }
}

impl ClientConfig {
    /// Loads a configuration from a TOML or JSON file, by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("could not read {}: {}", path.display(), e))
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: ClientConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)
                .map_err(|e| ClientError::config(format!("invalid TOML config: {}", e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| ClientError::config(format!("invalid JSON config: {}", e)))?,
            other => {
                return Err(ClientError::config(format!(
                    "unsupported config file extension: {}",
                    other
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants a well-formed configuration must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(ClientError::config("base_url must not be empty"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ClientError::config(format!(
                "base_url must be an http(s) URL, got {}",
                self.base_url
            )));
        }
        if self.subscription_polling.enabled && self.subscription_polling.period_ms == 0 {
            return Err(ClientError::config("subscription polling period must be positive"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ClientError::config("request timeout must be positive"));
        }
        Ok(())
    }

    /// Base URL with any trailing slash removed, ready for path joining.
    pub fn server_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.subscription_polling.period_ms)
    }

    /// Transport timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
