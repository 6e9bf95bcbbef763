//! Engine configuration
//!
//! Every tunable of the sample -> alert -> score -> act loop lives here, with
//! serde defaults so a partial TOML/JSON section is enough.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::optimizer::{self, OptimizationRule};
use crate::score::{self, ScoreBand};
use crate::snapshot::{keys, MetricKey};
use crate::thresholds::ThresholdConfig;
use crate::trends::TrendAnalyzer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history_capacity: usize,
    pub alert_log_capacity: usize,
    pub optimization_log_capacity: usize,
    /// Snapshots considered by trend analysis
    pub trend_window: usize,
    /// Percent change treated as stable, either way
    pub trend_band_percent: f64,
    /// Log entries included in a report
    pub report_tail: usize,
    pub tick_interval_ms: u64,
    pub sample_timeout_ms: u64,
    pub action_timeout_ms: u64,
    /// Per-subscriber event backlog before old events are dropped
    pub event_buffer: usize,
    pub thresholds: ThresholdConfig,
    pub score_bands: Vec<ScoreBand>,
    pub optimization_rules: Vec<OptimizationRule>,
    /// Metrics included in report trends
    pub trend_keys: Vec<MetricKey>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            alert_log_capacity: 200,
            optimization_log_capacity: 200,
            trend_window: 10,
            trend_band_percent: TrendAnalyzer::DEFAULT_BAND_PERCENT,
            report_tail: 10,
            tick_interval_ms: 5000,
            sample_timeout_ms: 2000,
            action_timeout_ms: 2000,
            event_buffer: 64,
            thresholds: ThresholdConfig::default(),
            score_bands: score::default_bands(),
            optimization_rules: optimizer::default_rules(),
            trend_keys: [
                keys::CPU_USAGE_PERCENT,
                keys::MEMORY_USAGE_PERCENT,
                keys::RESPONSE_TIME_MS,
                keys::ERROR_RATE_PERCENT,
            ]
            .into_iter()
            .filter_map(|k| k.parse().ok())
            .collect(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            (self.history_capacity, "history_capacity"),
            (self.alert_log_capacity, "alert_log_capacity"),
            (self.optimization_log_capacity, "optimization_log_capacity"),
            (self.trend_window, "trend_window"),
            (self.event_buffer, "event_buffer"),
        ];
        for (value, name) in non_zero {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity(name));
            }
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        for (value, name) in [
            (self.sample_timeout_ms, "sample_timeout_ms"),
            (self.action_timeout_ms, "action_timeout_ms"),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }
        TrendAnalyzer::new(self.trend_band_percent)?;

        for band in &self.score_bands {
            for tier in &band.tiers {
                if !tier.above.is_finite() || !tier.penalty.is_finite() || tier.penalty < 0.0 {
                    return Err(ConfigError::InvalidScoreBand {
                        metric: band.metric.to_string(),
                        above: tier.above,
                        penalty: tier.penalty,
                    });
                }
            }
        }
        for rule in &self.optimization_rules {
            if !rule.trigger_above.is_finite() {
                return Err(ConfigError::InvalidTrigger {
                    action: rule.action.to_string(),
                    trigger: rule.trigger_above,
                });
            }
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::ThresholdDirection;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.alert_log_capacity, 200);
        assert_eq!(config.trend_window, 10);
        assert_eq!(config.score_bands.len(), 4);
        assert_eq!(config.optimization_rules.len(), 3);
        assert_eq!(config.tick_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            history_capacity = 20
            tick_interval_ms = 1000

            [thresholds.rules]
            "system.cpu_usage_percent" = { limit = 70.0 }
            "network.throughput_mbps" = { limit = 5.0, direction = "below" }
            "#,
        )
        .unwrap();

        assert_eq!(config.history_capacity, 20);
        assert_eq!(config.alert_log_capacity, 200);
        assert_eq!(config.thresholds.len(), 2);
        let key: MetricKey = "network.throughput_mbps".parse().unwrap();
        assert_eq!(config.thresholds.rule(&key).unwrap().direction, ThresholdDirection::Below);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = EngineConfig { history_capacity: 0, ..EngineConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity("history_capacity")));

        let config = EngineConfig { tick_interval_ms: 0, ..EngineConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::InvalidInterval));

        let config = EngineConfig { trend_band_percent: -3.0, ..EngineConfig::default() };
        assert!(config.validate().is_err());

        let config = EngineConfig { sample_timeout_ms: 0, ..EngineConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout("sample_timeout_ms")));

        let config = EngineConfig { action_timeout_ms: 0, ..EngineConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout("action_timeout_ms")));

        let mut config = EngineConfig::default();
        config.score_bands[0].tiers[0].above = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidScoreBand { .. })));

        let mut config = EngineConfig::default();
        config.score_bands[1].tiers[1].penalty = -10.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidScoreBand { .. })));

        let mut config = EngineConfig::default();
        config.optimization_rules[0].trigger_above = f64::INFINITY;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidTrigger { action: "force_gc".into(), trigger: f64::INFINITY })
        );

        let nan_trigger = toml::from_str::<EngineConfig>(
            r#"
            [[optimization_rules]]
            action = "force_gc"
            metric = "memory.system_usage_percent"
            trigger_above = nan
            impact = "Reclaim unused memory"
            "#,
        )
        .unwrap();
        assert!(nan_trigger.validate().is_err());

        let bad_threshold = toml::from_str::<EngineConfig>(
            r#"
            [thresholds.rules]
            "system.cpu_usage_percent" = { limit = -5.0 }
            "#,
        );
        assert!(bad_threshold.is_err());
    }
}
