//! Automatic corrective actions
//!
//! Each `OptimizationRule` watches one metric against a secondary trigger,
//! set higher than the alerting limits. Rules are decided independently and
//! invoked one after the other through the `ActionExecutor`. Invocations are
//! best-effort: unavailable, failed or timed-out actions leave no record and
//! never fail the tick. No deduplication or rate limiting happens here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::ActionError;
use crate::ports::{ActionExecutor, ActionOutcome, ActionType};
use crate::snapshot::{keys, MetricKey, MetricsSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRule {
    pub action: ActionType,
    pub metric: MetricKey,
    /// Act when the metric is strictly above this value
    pub trigger_above: f64,
    /// Expected effect, copied into the record
    pub impact: String,
}

/// Memory pressure -> GC hint, CPU pressure -> throttling, slow DB -> query cache
pub fn default_rules() -> Vec<OptimizationRule> {
    [
        (ActionType::ForceGc, keys::MEMORY_USAGE_PERCENT, 90.0, "Reclaim unused memory"),
        (ActionType::ThrottleRequests, keys::CPU_USAGE_PERCENT, 90.0, "Shed load to relieve CPU pressure"),
        (ActionType::EnableQueryCache, keys::DB_QUERY_TIME_MS, 500.0, "Serve repeated queries from cache"),
    ]
    .into_iter()
    .filter_map(|(action, metric, trigger_above, impact)| {
        Some(OptimizationRule {
            action,
            metric: metric.parse().ok()?,
            trigger_above,
            impact: impact.to_string(),
        })
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecord {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// What the executor reported doing
    pub action: String,
    pub impact: String,
    pub metric_key: MetricKey,
    pub trigger_value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Decide and run the actions whose trigger `snapshot` exceeds
pub async fn maybe_act<E: ActionExecutor>(
    snapshot: &MetricsSnapshot,
    rules: &[OptimizationRule],
    executor: &E,
    action_timeout: Duration,
) -> Vec<OptimizationRecord> {
    let mut records = Vec::new();

    for rule in rules {
        let Some(value) = snapshot.get(&rule.metric) else { continue };
        if !value.is_finite() || value <= rule.trigger_above {
            continue;
        }

        let outcome = tokio::time::timeout(action_timeout, executor.invoke(&rule.action))
            .await
            .unwrap_or(ActionOutcome::Failed(ActionError::Timeout(action_timeout)));

        match outcome {
            ActionOutcome::Applied { detail } => {
                debug!("Applied {} ({} = {:.2})", rule.action, rule.metric, value);
                records.push(OptimizationRecord {
                    action_type: rule.action.clone(),
                    action: detail,
                    impact: rule.impact.clone(),
                    metric_key: rule.metric.clone(),
                    trigger_value: value,
                    timestamp: Utc::now(),
                });
            }
            ActionOutcome::Unavailable { reason } => {
                debug!("Skipping {}: {}", rule.action, reason);
            }
            ActionOutcome::Failed(e) => {
                debug!("Skipping {}: {}", rule.action, e);
            }
        }
    }

    records
}
