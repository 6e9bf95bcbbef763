//! Performance monitor: the tick scheduler
//!
//! Owns the mutable engine state (history, alert log, optimization log,
//! run flag) and drives one sample -> evaluate -> score -> act cycle per tick.
//!
//! - Ticks never overlap: they run sequentially in one task, missed timer
//!   fires are skipped and a tick guard coalesces manual ticks
//! - `stop()` does not wait for an in-flight tick, but no tick starts once it
//!   has returned (ticks check the run generation under the run lock)
//! - A failing or hung metric source only costs the current tick

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{ConfigError, MonitorError, SampleError};
use crate::events::{EventBus, EventReceiver, MonitorEvent};
use crate::history::{BoundedLog, HistoryBuffer};
use crate::optimizer::{self, OptimizationRecord};
use crate::ports::{ActionExecutor, MetricSource};
use crate::report::{Report, ReportBuilder};
use crate::score;
use crate::snapshot::MetricsSnapshot;
use crate::thresholds::{self, Alert, ThresholdConfig, ThresholdSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Stopped,
    Running,
}

/// Counters exposed for dashboards and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub ticks_completed: u64,
    pub ticks_skipped: u64,
    pub sampling_failures: u64,
}

/// What one tick did
#[derive(Debug, Clone)]
pub enum TickOutcome {
    Completed {
        snapshot: Arc<MetricsSnapshot>,
        health_score: f64,
        alerts: usize,
        optimizations: usize,
    },
    /// Another tick was still running
    Skipped,
    /// The monitor was stopped before this tick could start
    Cancelled,
    Failed(SampleError),
}

struct EngineState {
    history: HistoryBuffer,
    alerts: BoundedLog<Alert>,
    optimizations: BoundedLog<OptimizationRecord>,
    stats: MonitorStats,
}

struct RunState {
    running: bool,
    generation: u64,
    shutdown: Option<oneshot::Sender<()>>,
}

struct Inner<S, E> {
    source: S,
    executor: E,
    config: EngineConfig,
    thresholds: RwLock<Arc<ThresholdConfig>>,
    state: Mutex<EngineState>,
    run: Mutex<RunState>,
    tick_guard: tokio::sync::Mutex<()>,
    events: EventBus,
    reports: ReportBuilder,
}

/// Cloneable handle to one monitor instance
pub struct Monitor<S, E> {
    inner: Arc<Inner<S, E>>,
}

impl<S, E> Clone for Monitor<S, E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S: MetricSource, E: ActionExecutor> Monitor<S, E> {
    pub fn new(source: S, executor: E, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let state = EngineState {
            history: HistoryBuffer::new(config.history_capacity)?,
            alerts: BoundedLog::new(config.alert_log_capacity)?,
            optimizations: BoundedLog::new(config.optimization_log_capacity)?,
            stats: MonitorStats::default(),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                source,
                executor,
                thresholds: RwLock::new(Arc::new(config.thresholds.clone())),
                state: Mutex::new(state),
                run: Mutex::new(RunState { running: false, generation: 0, shutdown: None }),
                tick_guard: tokio::sync::Mutex::new(()),
                events: EventBus::new(config.event_buffer),
                reports: ReportBuilder::new(&config),
                config,
            }),
        })
    }

    /// Start ticking every `interval`; a no-op returning `Ok(false)` if already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, interval: Duration) -> Result<bool, MonitorError> {
        if interval.is_zero() {
            return Err(ConfigError::InvalidInterval.into());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;

        let (generation, shutdown) = {
            let mut run = self.inner.run.lock();
            if run.running {
                debug!("Monitor already running, ignoring start");
                return Ok(false);
            }
            let (tx, rx) = oneshot::channel();
            run.running = true;
            run.generation += 1;
            run.shutdown = Some(tx);
            (run.generation, rx)
        };

        info!("Performance monitor started (interval: {:?})", interval);
        self.inner.events.publish(MonitorEvent::Started {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        });

        runtime.spawn(run_loop(Arc::downgrade(&self.inner), generation, interval, shutdown));
        Ok(true)
    }

    /// Start with the configured `tick_interval_ms`
    pub fn start_default(&self) -> Result<bool, MonitorError> {
        self.start(self.inner.config.tick_interval())
    }

    /// Stop ticking; a no-op returning `false` if not running
    ///
    /// Returns immediately. An in-flight tick finishes, no new tick starts.
    pub fn stop(&self) -> bool {
        {
            let mut run = self.inner.run.lock();
            if !run.running {
                return false;
            }
            run.running = false;
            if let Some(tx) = run.shutdown.take() {
                let _ = tx.send(());
            }
        }

        info!("Performance monitor stopped");
        self.inner.events.publish(MonitorEvent::Stopped);
        true
    }

    pub fn is_running(&self) -> bool {
        self.inner.run.lock().running
    }

    pub fn state(&self) -> MonitorState {
        if self.is_running() {
            MonitorState::Running
        } else {
            MonitorState::Stopped
        }
    }

    /// Run one cycle now, outside the timer
    pub async fn tick(&self) -> TickOutcome {
        self.inner.run_tick(None).await
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn thresholds(&self) -> Arc<ThresholdConfig> {
        Arc::clone(&self.inner.thresholds.read())
    }

    /// Atomically swap the alerting thresholds
    ///
    /// Invalid input is rejected and the previous configuration stays in effect.
    pub fn replace_thresholds<T: Into<ThresholdSpec>>(&self, spec: T) -> Result<(), ConfigError> {
        let config = ThresholdConfig::try_from(spec.into()).inspect_err(|e| {
            warn!("Rejected threshold update: {}", e);
        })?;
        *self.inner.thresholds.write() = Arc::new(config);
        info!("Threshold configuration replaced");
        Ok(())
    }

    /// Last `n` snapshots, oldest first
    pub fn history(&self, n: usize) -> Vec<Arc<MetricsSnapshot>> {
        self.inner.state.lock().history.recent(n)
    }

    pub fn latest(&self) -> Option<Arc<MetricsSnapshot>> {
        self.inner.state.lock().history.latest()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.inner.state.lock().alerts.all()
    }

    pub fn optimizations(&self) -> Vec<OptimizationRecord> {
        self.inner.state.lock().optimizations.all()
    }

    pub fn stats(&self) -> MonitorStats {
        self.inner.state.lock().stats
    }

    /// Build a fresh report from the current state
    pub fn report(&self) -> Report {
        let (history, alerts, optimizations) = {
            let state = self.inner.state.lock();
            (state.history.clone(), state.alerts.clone(), state.optimizations.clone())
        };
        let thresholds = self.thresholds();
        self.inner
            .reports
            .build(&history, &alerts, &optimizations, &thresholds, chrono::Utc::now())
    }
}

impl<S: MetricSource, E: ActionExecutor> Inner<S, E> {
    async fn run_tick(&self, generation: Option<u64>) -> TickOutcome {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            debug!("Previous tick still running, skipping");
            self.state.lock().stats.ticks_skipped += 1;
            return TickOutcome::Skipped;
        };

        if let Some(generation) = generation {
            let run = self.run.lock();
            if !run.running || run.generation != generation {
                return TickOutcome::Cancelled;
            }
        }

        let sample_timeout = self.config.sample_timeout();
        let sampled = tokio::time::timeout(sample_timeout, self.source.sample())
            .await
            .unwrap_or(Err(SampleError::Timeout(sample_timeout)));

        let snapshot = match sampled {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                warn!("Sampling failed, skipping tick: {}", e);
                self.state.lock().stats.sampling_failures += 1;
                self.events.publish(MonitorEvent::Error { message: e.to_string() });
                return TickOutcome::Failed(e);
            }
        };

        let thresholds = Arc::clone(&self.thresholds.read());
        let alerts = thresholds::evaluate(&snapshot, &thresholds);
        {
            let mut state = self.state.lock();
            state.history.append(Arc::clone(&snapshot));
            state.alerts.extend(alerts.iter().cloned());
        }

        let health = score::score(&snapshot, &self.config.score_bands);
        debug!(
            "Tick: score {:.1}, {} alerts, {} bottlenecks",
            health.score,
            alerts.len(),
            health.bottlenecks.len()
        );

        let records = optimizer::maybe_act(
            &snapshot,
            &self.config.optimization_rules,
            &self.executor,
            self.config.action_timeout(),
        )
        .await;
        {
            let mut state = self.state.lock();
            state.optimizations.extend(records.iter().cloned());
            state.stats.ticks_completed += 1;
        }

        self.events.publish(MonitorEvent::SnapshotCollected {
            timestamp: snapshot.timestamp,
            health_score: health.score,
        });
        if !alerts.is_empty() {
            self.events.publish(MonitorEvent::AlertsRaised { alerts: alerts.clone() });
        }
        if !records.is_empty() {
            self.events.publish(MonitorEvent::OptimizationsApplied { records: records.clone() });
        }

        TickOutcome::Completed {
            snapshot,
            health_score: health.score,
            alerts: alerts.len(),
            optimizations: records.len(),
        }
    }
}

async fn run_loop<S: MetricSource, E: ActionExecutor>(
    inner: Weak<Inner<S, E>>,
    generation: u64,
    period: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                if let TickOutcome::Cancelled = inner.run_tick(Some(generation)).await {
                    break;
                }
            }
        }
    }

    debug!("Tick loop {} exited", generation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ActionOutcome, ActionType, NoopExecutor};
    use crate::snapshot::keys;
    use crate::thresholds::{AlertSeverity, ThresholdRule};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        cpu: f64,
    }

    impl MetricSource for CountingSource {
        async fn sample(&self) -> Result<MetricsSnapshot, SampleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            MetricsSnapshot::new(Utc::now())
                .with(keys::CPU_USAGE_PERCENT, self.cpu)
                .map_err(|e| SampleError::source(e.to_string()))
        }
    }

    struct FailingSource;

    impl MetricSource for FailingSource {
        async fn sample(&self) -> Result<MetricsSnapshot, SampleError> {
            Err(SampleError::source("sensor offline"))
        }
    }

    struct ApplyAll;

    impl ActionExecutor for ApplyAll {
        async fn invoke(&self, action: &ActionType) -> ActionOutcome {
            ActionOutcome::applied(format!("did {action}"))
        }
    }

    fn monitor(cpu: f64) -> Monitor<Arc<CountingSource>, NoopExecutor> {
        let source = Arc::new(CountingSource { cpu, ..Default::default() });
        Monitor::new(source, NoopExecutor, EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_manual_tick_records_snapshot_and_alerts() {
        let monitor = monitor(95.0);
        let outcome = monitor.tick().await;

        match outcome {
            TickOutcome::Completed { health_score, alerts, .. } => {
                assert_eq!(health_score, 80.0);
                assert_eq!(alerts, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(monitor.history(10).len(), 1);
        assert_eq!(monitor.alerts()[0].severity, AlertSeverity::Critical);
        assert_eq!(monitor.stats().ticks_completed, 1);
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let monitor = monitor(10.0);
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!(!monitor.stop());

        assert!(monitor.start(Duration::from_secs(60)).unwrap());
        assert!(!monitor.start(Duration::from_secs(60)).unwrap());
        assert_eq!(monitor.state(), MonitorState::Running);

        assert!(monitor.stop());
        assert!(!monitor.stop());
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    #[tokio::test]
    async fn test_started_event_saturates_huge_interval() {
        let monitor = monitor(10.0);
        let mut events = monitor.subscribe();

        monitor.start(Duration::from_secs(u64::MAX)).unwrap();
        monitor.stop();

        match events.try_recv().unwrap() {
            MonitorEvent::Started { interval_ms } => assert_eq!(interval_ms, u64::MAX),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let monitor = monitor(10.0);
        assert!(matches!(monitor.start(Duration::from_secs(1)), Err(MonitorError::NoRuntime)));
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let monitor = monitor(10.0);
        assert!(matches!(
            monitor.start(Duration::ZERO),
            Err(MonitorError::Config(ConfigError::InvalidInterval))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_stop() {
        let source = Arc::new(CountingSource::default());
        let monitor = Monitor::new(Arc::clone(&source), NoopExecutor, EngineConfig::default()).unwrap();

        monitor.start(Duration::from_secs(1)).unwrap();
        // first tick fires immediately, then one per second
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        monitor.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(monitor.history(100).len(), 3);
    }

    #[tokio::test]
    async fn test_sampling_failure_is_tick_local() {
        let monitor = Monitor::new(FailingSource, NoopExecutor, EngineConfig::default()).unwrap();
        let mut events = monitor.subscribe();

        assert!(matches!(monitor.tick().await, TickOutcome::Failed(_)));
        assert!(matches!(monitor.tick().await, TickOutcome::Failed(_)));

        match events.recv().await.unwrap() {
            MonitorEvent::Error { message } => assert!(message.contains("sensor offline")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(monitor.stats().sampling_failures, 2);
        assert!(monitor.latest().is_none());

        let report = monitor.report();
        assert!(report.current_snapshot.is_none());
        assert_eq!(report.summary.health_score, 0.0);
    }

    #[tokio::test]
    async fn test_tick_publishes_events_in_order() {
        let source = Arc::new(CountingSource { cpu: 97.0, ..Default::default() });
        let monitor = Monitor::new(source, ApplyAll, EngineConfig::default()).unwrap();
        let mut events = monitor.subscribe();

        monitor.tick().await;

        let names: Vec<&str> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.name())
            .collect();
        assert_eq!(names, vec!["snapshot_collected", "alerts_raised", "optimizations_applied"]);
        assert_eq!(monitor.optimizations()[0].action_type, ActionType::ThrottleRequests);
    }

    #[tokio::test]
    async fn test_replace_thresholds_is_atomic_and_validated() {
        let monitor = monitor(75.0);
        monitor.tick().await;
        assert!(monitor.alerts().is_empty());

        let mut bad = ThresholdSpec::default();
        bad.rules.insert("system.cpu_usage_percent".into(), ThresholdRule::above(-1.0));
        assert!(monitor.replace_thresholds(bad).is_err());
        assert_eq!(*monitor.thresholds(), ThresholdConfig::default());

        let lowered =
            ThresholdConfig::from_pairs([(keys::CPU_USAGE_PERCENT, ThresholdRule::above(70.0))]).unwrap();
        monitor.replace_thresholds(lowered).unwrap();
        monitor.tick().await;
        assert_eq!(monitor.alerts().len(), 1);
        assert_eq!(monitor.alerts()[0].severity, AlertSeverity::Warning);
    }
}
