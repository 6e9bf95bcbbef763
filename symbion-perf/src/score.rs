//! Composite health score
//!
//! Starts at 100 and subtracts the penalty of the highest tier each scored
//! metric exceeds. Every penalty comes with a `Bottleneck` describing it.
//! Pure: the same snapshot and bands always give the same result.

use serde::{Deserialize, Serialize};

use crate::snapshot::{keys, MetricKey, MetricsSnapshot};

pub const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BottleneckSeverity {
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub metric_key: MetricKey,
    pub severity: BottleneckSeverity,
    pub description: String,
    pub recommendation: String,
    pub penalty: f64,
}

/// Penalty applied when the metric is strictly above `above`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyTier {
    pub above: f64,
    pub penalty: f64,
}

/// Scoring rule for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBand {
    pub metric: MetricKey,
    pub label: String,
    pub severity: BottleneckSeverity,
    pub tiers: Vec<PenaltyTier>,
    pub recommendation: String,
}

impl ScoreBand {
    fn new(metric: &str, label: &str, severity: BottleneckSeverity, tiers: &[(f64, f64)], recommendation: &str) -> Option<Self> {
        Some(Self {
            metric: metric.parse().ok()?,
            label: label.to_string(),
            severity,
            tiers: tiers.iter().map(|(above, penalty)| PenaltyTier { above: *above, penalty: *penalty }).collect(),
            recommendation: recommendation.to_string(),
        })
    }

    /// Highest tier strictly exceeded by `value`
    fn matching_tier(&self, value: f64) -> Option<PenaltyTier> {
        self.tiers
            .iter()
            .filter(|t| value > t.above)
            .max_by(|a, b| a.above.total_cmp(&b.above))
            .copied()
    }
}

/// Default bands: CPU, memory, latency, error rate
pub fn default_bands() -> Vec<ScoreBand> {
    [
        ScoreBand::new(
            keys::CPU_USAGE_PERCENT,
            "CPU usage",
            BottleneckSeverity::High,
            &[(80.0, 20.0), (60.0, 10.0)],
            "Reduce CPU load: profile hot paths, offload batch work or scale out",
        ),
        ScoreBand::new(
            keys::MEMORY_USAGE_PERCENT,
            "Memory usage",
            BottleneckSeverity::High,
            &[(85.0, 20.0), (70.0, 10.0)],
            "Free memory: check for leaks, shrink caches or add capacity",
        ),
        ScoreBand::new(
            keys::RESPONSE_TIME_MS,
            "Response time",
            BottleneckSeverity::Medium,
            &[(1000.0, 15.0), (500.0, 8.0)],
            "Cut latency: cache frequent responses and optimize slow queries",
        ),
        ScoreBand::new(
            keys::ERROR_RATE_PERCENT,
            "Error rate",
            BottleneckSeverity::Critical,
            &[(5.0, 25.0), (2.0, 12.0)],
            "Investigate failing requests in the logs and fix the top error sources",
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub score: f64,
    pub bottlenecks: Vec<Bottleneck>,
}

pub fn score(snapshot: &MetricsSnapshot, bands: &[ScoreBand]) -> HealthScore {
    let mut total = MAX_SCORE;
    let mut bottlenecks = Vec::new();

    for band in bands {
        let Some(value) = snapshot.get(&band.metric) else { continue };
        let Some(tier) = band.matching_tier(value) else { continue };

        total -= tier.penalty;
        bottlenecks.push(Bottleneck {
            metric_key: band.metric.clone(),
            severity: band.severity,
            description: format!("{} at {:.2} exceeds {:.2}", band.label, value, tier.above),
            recommendation: band.recommendation.clone(),
            penalty: tier.penalty,
        });
    }

    HealthScore {
        score: total.clamp(0.0, MAX_SCORE),
        bottlenecks,
    }
}
