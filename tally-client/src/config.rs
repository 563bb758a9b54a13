//! Configuration for the interactive client.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tally_core::{ClientOptions, RetryPolicy};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Initial server to connect to.
    pub network: NetworkConfig,
    /// Request timeout and retry behavior.
    pub request: RequestConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Initial connection target. Port 0 means "do not auto-connect".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
}

/// Request plumbing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Per-request deadline in seconds.
    pub timeout_secs: u64,
    /// Retry behavior for failed or timed-out requests.
    pub retry: RetryConfig,
}

/// Retry tuning. The default (`max_attempts = 0`) retries forever,
/// immediately. Setting a bound is an explicit opt-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total dispatch attempts per task; 0 means unbounded.
    pub max_attempts: u32,
    /// Delay before each retry, in milliseconds.
    pub backoff_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            request: RequestConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 0,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            backoff_ms: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Convert into the core client's options.
    pub fn to_client_options(&self) -> ClientOptions {
        let retry = if self.request.retry.max_attempts == 0 {
            RetryPolicy::Unbounded
        } else {
            RetryPolicy::Bounded {
                max_attempts: self.request.retry.max_attempts,
                backoff: Duration::from_millis(self.request.retry.backoff_ms),
            }
        };
        ClientOptions {
            request_timeout: Duration::from_secs(self.request.timeout_secs.max(1)),
            retry,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ClientConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("timeout_secs"));
        assert!(text.contains("max_attempts"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = ClientConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.request.timeout_secs, 10);
        assert_eq!(parsed.network.port, 0);
    }

    #[test]
    fn default_retry_is_unbounded() {
        let options = ClientConfig::default().to_client_options();
        assert_eq!(options.retry, RetryPolicy::Unbounded);
        assert_eq!(options.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn bounded_retry_is_opt_in() {
        let mut cfg = ClientConfig::default();
        cfg.request.retry.max_attempts = 3;
        cfg.request.retry.backoff_ms = 250;
        let options = cfg.to_client_options();
        assert_eq!(
            options.retry,
            RetryPolicy::Bounded {
                max_attempts: 3,
                backoff: Duration::from_millis(250),
            }
        );
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let mut cfg = ClientConfig::default();
        cfg.request.timeout_secs = 0;
        assert_eq!(
            cfg.to_client_options().request_timeout,
            Duration::from_secs(1)
        );
    }
}
