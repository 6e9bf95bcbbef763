//! Report assembly
//!
//! Pure aggregation over the monitor state: latest snapshot, score and
//! bottlenecks, trends over the recent window and the tail of both logs.
//! An empty history is a valid input and yields a zeroed summary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::history::{BoundedLog, HistoryBuffer};
use crate::optimizer::OptimizationRecord;
use crate::score::{self, Bottleneck, ScoreBand};
use crate::snapshot::{keys, MetricKey, MetricsSnapshot};
use crate::thresholds::{Alert, ThresholdConfig};
use crate::trends::{TrendAnalyzer, TrendDirection, TrendResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub uptime_seconds: f64,
    pub health_score: f64,
    /// requests_per_second * uptime
    pub total_requests: f64,
    pub average_response_time_ms: f64,
    pub error_rate_percent: f64,
    pub snapshots_collected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub summary: ReportSummary,
    pub current_snapshot: Option<Arc<MetricsSnapshot>>,
    pub bottlenecks: Vec<Bottleneck>,
    pub recommendations: Vec<String>,
    pub trends: Vec<TrendResult>,
    pub recent_alerts: Vec<Alert>,
    pub recent_optimizations: Vec<OptimizationRecord>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReportBuilder {
    bands: Vec<ScoreBand>,
    analyzer: TrendAnalyzer,
    trend_keys: Vec<MetricKey>,
    trend_window: usize,
    tail: usize,
}

impl ReportBuilder {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            bands: config.score_bands.clone(),
            analyzer: TrendAnalyzer::new(config.trend_band_percent).unwrap_or_default(),
            trend_keys: config.trend_keys.clone(),
            trend_window: config.trend_window,
            tail: config.report_tail,
        }
    }

    pub fn build(
        &self,
        history: &HistoryBuffer,
        alerts: &BoundedLog<Alert>,
        optimizations: &BoundedLog<OptimizationRecord>,
        thresholds: &ThresholdConfig,
        generated_at: DateTime<Utc>,
    ) -> Report {
        let current = history.latest();
        let window = history.recent(self.trend_window);

        let trends: Vec<TrendResult> = self
            .trend_keys
            .iter()
            .map(|key| self.analyzer.trend(&window, key))
            .collect();

        let (summary, bottlenecks) = match current.as_deref() {
            Some(snapshot) => {
                let health = score::score(snapshot, &self.bands);
                (summarize(snapshot, health.score, history.len()), health.bottlenecks)
            }
            None => (ReportSummary::default(), Vec::new()),
        };

        let recommendations = recommend(&bottlenecks, &trends, thresholds);

        Report {
            summary,
            current_snapshot: current,
            bottlenecks,
            recommendations,
            trends,
            recent_alerts: alerts.recent(self.tail),
            recent_optimizations: optimizations.recent(self.tail),
            generated_at,
        }
    }
}

fn summarize(snapshot: &MetricsSnapshot, health_score: f64, snapshots_collected: usize) -> ReportSummary {
    let metric = |key: &str| snapshot.value(key).unwrap_or(0.0);
    let uptime_seconds = metric(keys::UPTIME_SECONDS);
    ReportSummary {
        uptime_seconds,
        health_score,
        total_requests: metric(keys::REQUESTS_PER_SECOND) * uptime_seconds,
        average_response_time_ms: metric(keys::RESPONSE_TIME_MS),
        error_rate_percent: metric(keys::ERROR_RATE_PERCENT),
        snapshots_collected,
    }
}

fn recommend(bottlenecks: &[Bottleneck], trends: &[TrendResult], thresholds: &ThresholdConfig) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |line: String| {
        if !out.contains(&line) {
            out.push(line);
        }
    };

    for bottleneck in bottlenecks {
        push(bottleneck.recommendation.clone());
    }

    for trend in trends.iter().filter(|t| t.direction == TrendDirection::Increasing) {
        let projected = trend
            .predicted_next_value
            .zip(thresholds.rule(&trend.metric_key))
            .filter(|(next, rule)| rule.is_breached(*next));
        match projected {
            Some((next, rule)) => push(format!(
                "{} is projected to reach {:.2}, past its limit of {:.2}",
                trend.metric_key, next, rule.limit
            )),
            None => push(format!(
                "{} is trending up ({:+.1}% over the last {} samples)",
                trend.metric_key, trend.percent_change, trend.samples
            )),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ActionType;
    use crate::thresholds::{AlertSeverity, ThresholdRule};
    use chrono::Duration;
    use uuid::Uuid;

    fn builder() -> ReportBuilder {
        ReportBuilder::new(&EngineConfig::default())
    }

    fn alert(i: usize) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            metric_key: keys::CPU_USAGE_PERCENT.parse().unwrap(),
            severity: AlertSeverity::Warning,
            message: format!("alert {i}"),
            value: 85.0,
            limit: 80.0,
            snapshot_timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_empty_engine_report() {
        let report = builder().build(
            &HistoryBuffer::default(),
            &BoundedLog::new(10).unwrap(),
            &BoundedLog::new(10).unwrap(),
            &ThresholdConfig::default(),
            Utc::now(),
        );

        assert_eq!(report.summary, ReportSummary::default());
        assert!(report.current_snapshot.is_none());
        assert!(report.bottlenecks.is_empty());
        assert!(report.recent_alerts.is_empty());
        assert!(report.recent_optimizations.is_empty());
        assert!(report.recommendations.is_empty());
        assert!(report.trends.iter().all(|t| !t.has_data()));
    }

    #[test]
    fn test_summary_from_latest_snapshot() {
        let mut history = HistoryBuffer::new(10).unwrap();
        let snapshot = MetricsSnapshot::new(Utc::now())
            .with(keys::UPTIME_SECONDS, 100.0)
            .unwrap()
            .with(keys::REQUESTS_PER_SECOND, 2.5)
            .unwrap()
            .with(keys::RESPONSE_TIME_MS, 600.0)
            .unwrap()
            .with(keys::ERROR_RATE_PERCENT, 1.0)
            .unwrap();
        history.append(Arc::new(snapshot));

        let report = builder().build(
            &history,
            &BoundedLog::new(10).unwrap(),
            &BoundedLog::new(10).unwrap(),
            &ThresholdConfig::default(),
            Utc::now(),
        );

        assert_eq!(report.summary.uptime_seconds, 100.0);
        assert_eq!(report.summary.total_requests, 250.0);
        assert_eq!(report.summary.average_response_time_ms, 600.0);
        assert_eq!(report.summary.health_score, 92.0);
        assert_eq!(report.summary.snapshots_collected, 1);
        assert_eq!(report.bottlenecks.len(), 1);
        assert_eq!(report.recommendations.len(), 1);
    }

    #[test]
    fn test_logs_are_sliced_to_tail() {
        let mut alerts = BoundedLog::new(200).unwrap();
        alerts.extend((0..25).map(alert));
        let mut optimizations = BoundedLog::new(200).unwrap();
        optimizations.extend((0..12).map(|i| OptimizationRecord {
            action_type: ActionType::ForceGc,
            action: format!("gc {i}"),
            impact: "memory".into(),
            metric_key: keys::MEMORY_USAGE_PERCENT.parse().unwrap(),
            trigger_value: 95.0,
            timestamp: Utc::now(),
        }));

        let report = builder().build(
            &HistoryBuffer::default(),
            &alerts,
            &optimizations,
            &ThresholdConfig::default(),
            Utc::now(),
        );

        assert_eq!(report.recent_alerts.len(), 10);
        assert_eq!(report.recent_alerts[0].message, "alert 15");
        assert_eq!(report.recent_alerts[9].message, "alert 24");
        assert_eq!(report.recent_optimizations.len(), 10);
        assert_eq!(report.recent_optimizations[9].action, "gc 11");
    }

    #[test]
    fn test_rising_metric_projected_past_limit() {
        let mut history = HistoryBuffer::new(10).unwrap();
        let start = Utc::now();
        for (i, cpu) in [50.0, 60.0, 70.0, 78.0].into_iter().enumerate() {
            let s = MetricsSnapshot::new(start + Duration::seconds(i as i64))
                .with(keys::CPU_USAGE_PERCENT, cpu)
                .unwrap();
            history.append(Arc::new(s));
        }
        let thresholds =
            ThresholdConfig::from_pairs([(keys::CPU_USAGE_PERCENT, ThresholdRule::above(75.0))]).unwrap();

        let report = builder().build(
            &history,
            &BoundedLog::new(10).unwrap(),
            &BoundedLog::new(10).unwrap(),
            &thresholds,
            Utc::now(),
        );

        let cpu_trend = &report.trends[0];
        assert_eq!(cpu_trend.direction, TrendDirection::Increasing);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("projected") && r.contains("system.cpu_usage_percent")));
    }
}
