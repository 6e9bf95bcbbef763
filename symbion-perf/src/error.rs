//! Error taxonomy for the performance engine
//!
//! - `SampleError`: a metric source failed or timed out (tick-local, retried next tick)
//! - `ActionError`: an optimization action failed or timed out (skipped silently)
//! - `ConfigError`: configuration rejected at the update call (prior config stays in effect)

use std::time::Duration;

/// Failure while sampling a metric source
#[derive(Debug, Clone, thiserror::Error)]
pub enum SampleError {
    #[error("metric source failed: {0}")]
    Source(String),
    #[error("metric source timed out after {0:?}")]
    Timeout(Duration),
}

impl SampleError {
    pub fn source<S: Into<String>>(message: S) -> Self {
        SampleError::Source(message.into())
    }
}

/// Failure while running an optimization action
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActionError {
    #[error("action failed: {0}")]
    Failed(String),
    #[error("action timed out after {0:?}")]
    Timeout(Duration),
}

/// Rejected configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid metric key '{0}' (expected <domain>.<name>)")]
    InvalidMetricKey(String),
    #[error("invalid limit {limit} for '{key}': must be finite and positive")]
    InvalidLimit { key: String, limit: f64 },
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
    #[error("tick interval must be greater than zero")]
    InvalidInterval,
    #[error("invalid severity policy: critical ratio {0} must be finite and >= 1.0")]
    InvalidSeverityPolicy(f64),
    #[error("invalid trend band: {0}")]
    InvalidTrendBand(f64),
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("invalid score band for '{metric}': tier above {above} with penalty {penalty}")]
    InvalidScoreBand { metric: String, above: f64, penalty: f64 },
    #[error("invalid trigger {trigger} for action '{action}': must be finite")]
    InvalidTrigger { action: String, trigger: f64 },
}

/// Umbrella error for monitor operations
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("monitor requires a running tokio runtime")]
    NoRuntime,
}
