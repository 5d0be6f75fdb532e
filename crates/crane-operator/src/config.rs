//! Environment configuration for the operator
//!
//! Reads go through [`EnvConfig`] so parsing can be tested without touching
//! the process environment.

use std::time::Duration;

use crane_autoscaler::controller::{DEFAULT_ERROR_REQUEUE, DEFAULT_RESYNC_INTERVAL};

/// Restrict the controller to one namespace
pub const ENV_WATCH_NAMESPACE: &str = "CRANE_WATCH_NAMESPACE";
/// Success requeue interval in seconds
pub const ENV_RESYNC_INTERVAL_SECS: &str = "CRANE_RESYNC_INTERVAL_SECS";
/// Failure requeue interval in seconds
pub const ENV_ERROR_REQUEUE_SECS: &str = "CRANE_ERROR_REQUEUE_SECS";
/// OTLP gRPC endpoint for traces and metrics
pub const ENV_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
/// Pod name from the downward API, reported as the event instance
pub const ENV_POD_NAME: &str = "POD_NAME";

/// Trait for reading environment variables
#[cfg_attr(test, mockall::automock)]
pub trait EnvConfig: Send + Sync {
    /// Value of `key`, `None` when unset or not unicode
    fn var(&self, key: &str) -> Option<String>;
}

/// Default implementation that reads from the process environment
#[derive(Clone, Default)]
pub struct OsEnvConfig;

impl EnvConfig for OsEnvConfig {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Invalid environment configuration
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Value could not be parsed as a positive number of seconds
    #[error("{key} must be a positive number of seconds, got {value:?}")]
    InvalidSeconds {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
    },
}

/// Resolved operator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace to watch; all namespaces when `None`
    pub watch_namespace: Option<String>,
    /// Requeue interval after a successful pass
    pub resync_interval: Duration,
    /// Requeue interval after a failed pass
    pub error_requeue: Duration,
    /// OTLP endpoint; telemetry stays local when `None`
    pub otlp_endpoint: Option<String>,
    /// Name of this replica on published events
    pub pod_name: Option<String>,
}

impl OperatorConfig {
    /// Read configuration from `env`
    pub fn from_env(env: &dyn EnvConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            watch_namespace: non_empty(env.var(ENV_WATCH_NAMESPACE)),
            resync_interval: seconds(env, ENV_RESYNC_INTERVAL_SECS, DEFAULT_RESYNC_INTERVAL)?,
            error_requeue: seconds(env, ENV_ERROR_REQUEUE_SECS, DEFAULT_ERROR_REQUEUE)?,
            otlp_endpoint: non_empty(env.var(ENV_OTLP_ENDPOINT)),
            pod_name: non_empty(env.var(ENV_POD_NAME)),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn seconds(env: &dyn EnvConfig, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let Some(raw) = non_empty(env.var(key)) else {
        return Ok(default);
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidSeconds { key, value: raw }),
    }
}
