//! Threshold configuration and alert evaluation
//!
//! A `ThresholdConfig` maps metric keys to a limit and a comparison
//! direction. Evaluation emits one `Alert` per breached key on every tick;
//! there is no cross-tick deduplication, the alert log is a history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::ConfigError;
use crate::snapshot::{keys, MetricKey, MetricsSnapshot};

/// Which side of the limit is a breach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdDirection {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub limit: f64,
    #[serde(default = "default_direction")]
    pub direction: ThresholdDirection,
}

fn default_direction() -> ThresholdDirection {
    ThresholdDirection::Above
}

impl ThresholdRule {
    pub fn above(limit: f64) -> Self {
        Self { limit, direction: ThresholdDirection::Above }
    }

    pub fn below(limit: f64) -> Self {
        Self { limit, direction: ThresholdDirection::Below }
    }

    pub fn is_breached(&self, value: f64) -> bool {
        match self.direction {
            ThresholdDirection::Above => value > self.limit,
            ThresholdDirection::Below => value < self.limit,
        }
    }

    /// How many times past the limit `value` sits (>= 1.0 once breached)
    pub fn overshoot_ratio(&self, value: f64) -> f64 {
        match self.direction {
            ThresholdDirection::Above => value / self.limit,
            ThresholdDirection::Below if value <= 0.0 => f64::INFINITY,
            ThresholdDirection::Below => self.limit / value,
        }
    }
}

/// Severity breakpoints
///
/// Up to `critical_ratio` times the limit is a warning, beyond it is critical.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityPolicy {
    pub critical_ratio: f64,
}

impl SeverityPolicy {
    pub const DEFAULT_CRITICAL_RATIO: f64 = 1.1;

    pub fn classify(&self, ratio: f64) -> AlertSeverity {
        if ratio > self.critical_ratio {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.critical_ratio.is_finite() || self.critical_ratio < 1.0 {
            return Err(ConfigError::InvalidSeverityPolicy(self.critical_ratio));
        }
        Ok(())
    }
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        Self { critical_ratio: Self::DEFAULT_CRITICAL_RATIO }
    }
}

/// Unvalidated threshold configuration, as read from a file or an API call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdSpec {
    #[serde(default)]
    pub rules: BTreeMap<String, ThresholdRule>,
    #[serde(default)]
    pub severity: SeverityPolicy,
}

/// Validated, hot-swappable alerting limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ThresholdSpec", into = "ThresholdSpec")]
pub struct ThresholdConfig {
    rules: BTreeMap<MetricKey, ThresholdRule>,
    severity: SeverityPolicy,
}

impl TryFrom<ThresholdSpec> for ThresholdConfig {
    type Error = ConfigError;

    fn try_from(spec: ThresholdSpec) -> Result<Self, Self::Error> {
        let rules = spec
            .rules
            .into_iter()
            .map(|(key, rule)| Ok((key.parse::<MetricKey>()?, rule)))
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;
        ThresholdConfig::new(rules, spec.severity)
    }
}

impl From<ThresholdConfig> for ThresholdSpec {
    fn from(config: ThresholdConfig) -> Self {
        ThresholdSpec {
            rules: config.rules.into_iter().map(|(k, r)| (k.to_string(), r)).collect(),
            severity: config.severity,
        }
    }
}

impl ThresholdConfig {
    pub fn new(
        rules: BTreeMap<MetricKey, ThresholdRule>,
        severity: SeverityPolicy,
    ) -> Result<Self, ConfigError> {
        severity.validate()?;
        for (key, rule) in &rules {
            if !rule.limit.is_finite() || rule.limit <= 0.0 {
                return Err(ConfigError::InvalidLimit { key: key.to_string(), limit: rule.limit });
            }
        }
        Ok(Self { rules, severity })
    }

    pub fn empty() -> Self {
        Self { rules: BTreeMap::new(), severity: SeverityPolicy::default() }
    }

    /// Build from `(key, rule)` pairs with string keys
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, ThresholdRule)>,
    {
        let rules = pairs
            .into_iter()
            .map(|(key, rule)| Ok((key.parse::<MetricKey>()?, rule)))
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;
        Self::new(rules, SeverityPolicy::default())
    }

    pub fn with_severity(self, severity: SeverityPolicy) -> Result<Self, ConfigError> {
        Self::new(self.rules, severity)
    }

    pub fn rules(&self) -> &BTreeMap<MetricKey, ThresholdRule> {
        &self.rules
    }

    pub fn rule(&self, key: &MetricKey) -> Option<&ThresholdRule> {
        self.rules.get(key)
    }

    pub fn severity(&self) -> SeverityPolicy {
        self.severity
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        let rules = [
            (keys::CPU_USAGE_PERCENT, ThresholdRule::above(80.0)),
            (keys::MEMORY_USAGE_PERCENT, ThresholdRule::above(85.0)),
            (keys::RESPONSE_TIME_MS, ThresholdRule::above(1000.0)),
            (keys::ERROR_RATE_PERCENT, ThresholdRule::above(5.0)),
        ];
        let rules = rules
            .into_iter()
            .filter_map(|(key, rule)| key.parse::<MetricKey>().ok().map(|k| (k, rule)))
            .collect();
        Self { rules, severity: SeverityPolicy::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// One breached limit on one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub metric_key: MetricKey,
    pub severity: AlertSeverity,
    pub message: String,
    pub value: f64,
    pub limit: f64,
    pub snapshot_timestamp: DateTime<Utc>,
}

/// Compare `snapshot` against every configured limit
///
/// Keys missing from the snapshot are skipped.
pub fn evaluate(snapshot: &MetricsSnapshot, config: &ThresholdConfig) -> Vec<Alert> {
    config
        .rules
        .iter()
        .filter_map(|(key, rule)| {
            let value = snapshot.get(key)?;
            if !rule.is_breached(value) {
                return None;
            }
            let severity = config.severity.classify(rule.overshoot_ratio(value));
            let relation = match rule.direction {
                ThresholdDirection::Above => "above",
                ThresholdDirection::Below => "below",
            };
            Some(Alert {
                id: Uuid::new_v4(),
                metric_key: key.clone(),
                severity,
                message: format!("{key} is {value:.2}, {relation} limit {:.2}", rule.limit),
                value,
                limit: rule.limit,
                snapshot_timestamp: snapshot.timestamp,
            })
        })
        .collect()
}
