//! Collaborator ports consumed by the engine
//!
//! The monitor is generic over two seams:
//! - `MetricSource` supplies one `MetricsSnapshot` per tick
//! - `ActionExecutor` performs corrective actions (GC hint, throttling, query cache...)
//!
//! How metrics are physically read, or how an action is carried out, is the
//! implementor's business; the engine only drives the protocol around them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{ActionError, SampleError};
use crate::snapshot::MetricsSnapshot;

/// Supplies snapshots on demand
pub trait MetricSource: Send + Sync + 'static {
    fn sample(&self) -> impl Future<Output = Result<MetricsSnapshot, SampleError>> + Send;
}

/// Performs optimization actions on behalf of the engine
pub trait ActionExecutor: Send + Sync + 'static {
    fn invoke(&self, action: &ActionType) -> impl Future<Output = ActionOutcome> + Send;
}

impl<T: MetricSource> MetricSource for Arc<T> {
    fn sample(&self) -> impl Future<Output = Result<MetricsSnapshot, SampleError>> + Send {
        (**self).sample()
    }
}

impl<T: ActionExecutor> ActionExecutor for Arc<T> {
    fn invoke(&self, action: &ActionType) -> impl Future<Output = ActionOutcome> + Send {
        (**self).invoke(action)
    }
}

/// Optimization action kinds (extensible through `Custom`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    ForceGc,
    ThrottleRequests,
    EnableQueryCache,
    Custom(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::ForceGc => "force_gc",
            ActionType::ThrottleRequests => "throttle_requests",
            ActionType::EnableQueryCache => "enable_query_cache",
            ActionType::Custom(name) => name,
        }
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "force_gc" => ActionType::ForceGc,
            "throttle_requests" => ActionType::ThrottleRequests,
            "enable_query_cache" => ActionType::EnableQueryCache,
            _ => ActionType::Custom(value),
        }
    }
}

impl From<&str> for ActionType {
    fn from(value: &str) -> Self {
        ActionType::from(value.to_string())
    }
}

impl From<ActionType> for String {
    fn from(action: ActionType) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one `ActionExecutor::invoke` call
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// The action ran; `detail` ends up in the optimization record
    Applied { detail: String },
    /// The runtime cannot perform this action (e.g. no forced GC available)
    Unavailable { reason: String },
    Failed(ActionError),
}

impl ActionOutcome {
    pub fn applied<S: Into<String>>(detail: S) -> Self {
        ActionOutcome::Applied { detail: detail.into() }
    }

    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        ActionOutcome::Unavailable { reason: reason.into() }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied { .. })
    }
}

/// Executor for hosts with no corrective actions wired up
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExecutor;

impl ActionExecutor for NoopExecutor {
    async fn invoke(&self, action: &ActionType) -> ActionOutcome {
        ActionOutcome::unavailable(format!("no executor configured for {action}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_names() {
        assert_eq!(ActionType::from("force_gc"), ActionType::ForceGc);
        assert_eq!(ActionType::from("throttle_requests"), ActionType::ThrottleRequests);
        assert_eq!(ActionType::from("enable_query_cache"), ActionType::EnableQueryCache);
        assert_eq!(
            ActionType::from("flush_pool"),
            ActionType::Custom("flush_pool".to_string())
        );
        assert_eq!(ActionType::Custom("flush_pool".into()).to_string(), "flush_pool");

        let json = serde_json::to_string(&ActionType::EnableQueryCache).unwrap();
        assert_eq!(json, "\"enable_query_cache\"");
    }

    #[tokio::test]
    async fn test_noop_executor_is_unavailable() {
        let outcome = NoopExecutor.invoke(&ActionType::ForceGc).await;
        assert!(matches!(outcome, ActionOutcome::Unavailable { .. }));
        assert!(!outcome.is_applied());
    }
}
