//! Symbion Perf - adaptive performance-monitoring engine
//!
//! Periodically samples runtime metrics and runs each snapshot through:
//! - a bounded rolling history
//! - threshold alerting (warning / critical)
//! - a composite 0-100 health score with bottleneck diagnosis
//! - automatic corrective actions above secondary triggers
//!
//! Trends, predictions and reports are computed on demand from the history.
//! Metric collection and action execution are injected through the
//! [`MetricSource`] and [`ActionExecutor`] ports.

pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod monitor;
pub mod optimizer;
pub mod ports;
pub mod report;
pub mod score;
pub mod snapshot;
pub mod thresholds;
pub mod trends;

pub use config::EngineConfig;
pub use error::{ActionError, ConfigError, MonitorError, SampleError};
pub use events::{EventReceiver, MonitorEvent};
pub use history::{BoundedLog, HistoryBuffer};
pub use monitor::{Monitor, MonitorState, MonitorStats, TickOutcome};
pub use optimizer::{OptimizationRecord, OptimizationRule};
pub use ports::{ActionExecutor, ActionOutcome, ActionType, MetricSource, NoopExecutor};
pub use report::{Report, ReportBuilder, ReportSummary};
pub use score::{Bottleneck, BottleneckSeverity, HealthScore};
pub use snapshot::{keys, MetricDomain, MetricKey, MetricsSnapshot};
pub use thresholds::{Alert, AlertSeverity, ThresholdConfig, ThresholdDirection, ThresholdRule, ThresholdSpec};
pub use trends::{TrendAnalyzer, TrendDirection, TrendResult};
