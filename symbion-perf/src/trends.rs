//! Trend detection and next-value prediction over a window of history

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ConfigError;
use crate::snapshot::{MetricKey, MetricsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub metric_key: MetricKey,
    pub direction: TrendDirection,
    pub percent_change: f64,
    pub predicted_next_value: Option<f64>,
    /// Number of points the result was computed from
    pub samples: usize,
}

impl TrendResult {
    /// "stable, no data" result for windows with fewer than two points
    pub fn no_data(metric_key: MetricKey, samples: usize) -> Self {
        Self {
            metric_key,
            direction: TrendDirection::Stable,
            percent_change: 0.0,
            predicted_next_value: None,
            samples,
        }
    }

    pub fn has_data(&self) -> bool {
        self.samples >= TrendAnalyzer::MIN_TREND_POINTS
    }
}

/// Sliding-window trend analyzer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendAnalyzer {
    /// Changes within +/- this percentage count as stable
    band_percent: f64,
    /// Prediction adjustment applied in the trend's direction
    prediction_adjust: f64,
}

impl TrendAnalyzer {
    pub const DEFAULT_BAND_PERCENT: f64 = 5.0;
    pub const DEFAULT_PREDICTION_ADJUST: f64 = 0.10;
    pub const MIN_TREND_POINTS: usize = 2;
    pub const MIN_PREDICTION_POINTS: usize = 3;

    pub fn new(band_percent: f64) -> Result<Self, ConfigError> {
        if !band_percent.is_finite() || band_percent < 0.0 {
            return Err(ConfigError::InvalidTrendBand(band_percent));
        }
        Ok(Self { band_percent, prediction_adjust: Self::DEFAULT_PREDICTION_ADJUST })
    }

    pub fn band_percent(&self) -> f64 {
        self.band_percent
    }

    /// Direction and magnitude of `key` across `window` (oldest first)
    ///
    /// Snapshots that lack the key are ignored.
    pub fn trend(&self, window: &[Arc<MetricsSnapshot>], key: &MetricKey) -> TrendResult {
        let values = series(window, key);
        if values.len() < Self::MIN_TREND_POINTS {
            return TrendResult::no_data(key.clone(), values.len());
        }

        let percent_change = percent_change(&values);
        let direction = self.classify(percent_change);
        TrendResult {
            metric_key: key.clone(),
            direction,
            percent_change,
            predicted_next_value: self.predict_values(&values, direction),
            samples: values.len(),
        }
    }

    /// Heuristic next value for `key`, `None` with fewer than three points
    pub fn predict(&self, window: &[Arc<MetricsSnapshot>], key: &MetricKey) -> Option<f64> {
        self.trend(window, key).predicted_next_value
    }

    fn classify(&self, percent_change: f64) -> TrendDirection {
        if percent_change > self.band_percent {
            TrendDirection::Increasing
        } else if percent_change < -self.band_percent {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }

    fn predict_values(&self, values: &[f64], direction: TrendDirection) -> Option<f64> {
        if values.len() < Self::MIN_PREDICTION_POINTS {
            return None;
        }
        let tail = &values[values.len() - Self::MIN_PREDICTION_POINTS..];
        let average = tail.iter().sum::<f64>() / tail.len() as f64;
        let factor = match direction {
            TrendDirection::Increasing => 1.0 + self.prediction_adjust,
            TrendDirection::Decreasing => 1.0 - self.prediction_adjust,
            TrendDirection::Stable => 1.0,
        };
        Some(average * factor)
    }
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self {
            band_percent: Self::DEFAULT_BAND_PERCENT,
            prediction_adjust: Self::DEFAULT_PREDICTION_ADJUST,
        }
    }
}

fn series(window: &[Arc<MetricsSnapshot>], key: &MetricKey) -> Vec<f64> {
    window.iter().filter_map(|s| s.get(key)).collect()
}

// A zero starting point has no meaningful ratio: report +/-100% by sign, 0 if flat.
fn percent_change(values: &[f64]) -> f64 {
    let (first, last) = match (values.first(), values.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return 0.0,
    };
    if first == 0.0 {
        if last == 0.0 {
            0.0
        } else {
            (last - first).signum() * 100.0
        }
    } else {
        (last - first) / first.abs() * 100.0
    }
}
