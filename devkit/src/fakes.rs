/*!
Fakes des ports `MetricSource` et `ActionExecutor`

- `ScriptedSource`: rejoue une file d'étapes (snapshot, panne, blocage, délai)
  puis répète le dernier snapshot configuré
- `RecordingExecutor`: enregistre chaque action invoquée et renvoie le
  résultat scripté pour ce type d'action
- `SnapshotBuilder`: construction concise de snapshots de test
*/

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use symbion_perf::{
    keys, ActionError, ActionExecutor, ActionOutcome, ActionType, ConfigError, MetricSource, MetricsSnapshot,
    SampleError,
};

/// One scripted `sample()` result
#[derive(Debug, Clone)]
pub enum Step {
    Snapshot(MetricsSnapshot),
    Fail(String),
    /// Never resolves; only a sample timeout gets the tick out
    Hang,
    Delayed(MetricsSnapshot, Duration),
}

/// Metric source replaying a script
#[derive(Debug, Default)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    repeat: Mutex<Option<MetricsSnapshot>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `snapshot` (re-stamped) once the script runs out
    pub fn repeating(snapshot: MetricsSnapshot) -> Self {
        let source = Self::new();
        *source.repeat.lock() = Some(snapshot);
        source
    }

    pub fn push(&self, snapshot: MetricsSnapshot) -> &Self {
        self.steps.lock().push_back(Step::Snapshot(snapshot));
        self
    }

    pub fn push_failure<S: Into<String>>(&self, message: S) -> &Self {
        self.steps.lock().push_back(Step::Fail(message.into()));
        self
    }

    pub fn push_hang(&self) -> &Self {
        self.steps.lock().push_back(Step::Hang);
        self
    }

    pub fn push_delayed(&self, snapshot: MetricsSnapshot, delay: Duration) -> &Self {
        self.steps.lock().push_back(Step::Delayed(snapshot, delay));
        self
    }

    /// Replace the snapshot repeated after the script
    pub fn set_repeat(&self, snapshot: MetricsSnapshot) {
        *self.repeat.lock() = Some(snapshot);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn remaining_steps(&self) -> usize {
        self.steps.lock().len()
    }

    fn next_step(&self) -> Option<Step> {
        if let Some(step) = self.steps.lock().pop_front() {
            return Some(step);
        }
        self.repeat.lock().clone().map(|mut snapshot| {
            snapshot.timestamp = Utc::now();
            Step::Snapshot(snapshot)
        })
    }
}

impl MetricSource for ScriptedSource {
    async fn sample(&self) -> Result<MetricsSnapshot, SampleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.next_step() {
            Some(Step::Snapshot(snapshot)) => Ok(snapshot),
            Some(Step::Fail(message)) => Err(SampleError::Source(message)),
            Some(Step::Hang) => std::future::pending().await,
            Some(Step::Delayed(snapshot, delay)) => {
                tokio::time::sleep(delay).await;
                Ok(snapshot)
            }
            None => Err(SampleError::source("script exhausted")),
        }
    }
}

/// Scripted behaviour for one action type
#[derive(Debug, Clone)]
enum Reaction {
    Outcome(ActionOutcome),
    Hang,
}

/// Action executor that records invocations
///
/// Unscripted actions are applied.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    reactions: Mutex<HashMap<ActionType, Reaction>>,
    invocations: Mutex<Vec<ActionType>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(self, action: ActionType, outcome: ActionOutcome) -> Self {
        self.reactions.lock().insert(action, Reaction::Outcome(outcome));
        self
    }

    pub fn failing(self, action: ActionType, reason: &str) -> Self {
        self.with_outcome(action, ActionOutcome::Failed(ActionError::Failed(reason.to_string())))
    }

    pub fn unavailable(self, action: ActionType) -> Self {
        self.with_outcome(action, ActionOutcome::unavailable("not supported by this runtime"))
    }

    /// The action never completes
    pub fn hanging(self, action: ActionType) -> Self {
        self.reactions.lock().insert(action, Reaction::Hang);
        self
    }

    pub fn invocations(&self) -> Vec<ActionType> {
        self.invocations.lock().clone()
    }

    pub fn invocation_count(&self, action: &ActionType) -> usize {
        self.invocations.lock().iter().filter(|a| *a == action).count()
    }
}

impl ActionExecutor for RecordingExecutor {
    async fn invoke(&self, action: &ActionType) -> ActionOutcome {
        self.invocations.lock().push(action.clone());
        let reaction = self.reactions.lock().get(action).cloned();

        match reaction {
            Some(Reaction::Outcome(outcome)) => outcome,
            Some(Reaction::Hang) => std::future::pending().await,
            None => ActionOutcome::applied(format!("{action} applied")),
        }
    }
}

/// Builder for test snapshots
///
/// Invalid keys surface as a `ConfigError` from [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    timestamp: Option<DateTime<Utc>>,
    metrics: Vec<(String, f64)>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn metric(mut self, key: &str, value: f64) -> Self {
        self.metrics.push((key.to_string(), value));
        self
    }

    pub fn cpu(self, percent: f64) -> Self {
        self.metric(keys::CPU_USAGE_PERCENT, percent)
    }

    pub fn memory(self, percent: f64) -> Self {
        self.metric(keys::MEMORY_USAGE_PERCENT, percent)
    }

    pub fn response_time(self, ms: f64) -> Self {
        self.metric(keys::RESPONSE_TIME_MS, ms)
    }

    pub fn error_rate(self, percent: f64) -> Self {
        self.metric(keys::ERROR_RATE_PERCENT, percent)
    }

    pub fn query_time(self, ms: f64) -> Self {
        self.metric(keys::DB_QUERY_TIME_MS, ms)
    }

    pub fn build(self) -> Result<MetricsSnapshot, ConfigError> {
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        self.metrics
            .iter()
            .try_fold(MetricsSnapshot::new(timestamp), |snapshot, (key, value)| snapshot.with(key, *value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_source_replays_then_repeats() {
        let source = ScriptedSource::repeating(SnapshotBuilder::new().cpu(10.0).build().unwrap());
        source
            .push(SnapshotBuilder::new().cpu(50.0).build().unwrap())
            .push_failure("sensor offline");

        assert_eq!(source.sample().await.unwrap().value(keys::CPU_USAGE_PERCENT), Some(50.0));
        assert!(matches!(source.sample().await, Err(SampleError::Source(m)) if m == "sensor offline"));
        assert_eq!(source.sample().await.unwrap().value(keys::CPU_USAGE_PERCENT), Some(10.0));
        assert_eq!(source.calls(), 3);
        assert_eq!(source.remaining_steps(), 0);
    }

    #[tokio::test]
    async fn test_empty_script_fails() {
        let source = ScriptedSource::new();
        assert!(source.sample().await.is_err());
    }

    #[tokio::test]
    async fn test_recording_executor() {
        let executor = RecordingExecutor::new().failing(ActionType::ForceGc, "no gc");

        assert!(executor.invoke(&ActionType::ThrottleRequests).await.is_applied());
        assert!(matches!(executor.invoke(&ActionType::ForceGc).await, ActionOutcome::Failed(_)));
        assert_eq!(executor.invocations(), vec![ActionType::ThrottleRequests, ActionType::ForceGc]);
        assert_eq!(executor.invocation_count(&ActionType::ForceGc), 1);
    }

    #[test]
    fn test_snapshot_builder() {
        let snapshot = SnapshotBuilder::new().cpu(42.0).query_time(600.0).build().unwrap();
        assert_eq!(snapshot.value(keys::DB_QUERY_TIME_MS), Some(600.0));
        assert_eq!(snapshot.metric_count(), 2);

        assert!(SnapshotBuilder::new().metric("no_domain", 1.0).build().is_err());
    }
}
