//! Bounded rolling stores
//!
//! `BoundedLog` keeps the last N entries in append order and drops the oldest
//! on overflow. The alert and optimization logs use it directly; `HistoryBuffer`
//! wraps it for snapshots, which are shared as `Arc`s so readers copy pointers,
//! never half-written data.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::snapshot::MetricsSnapshot;

/// Append-only FIFO with a fixed capacity
#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> BoundedLog<T> {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity("log capacity"));
        }
        Ok(Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Append one entry, evicting the oldest when full
    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, entries: I) {
        for entry in entries {
            self.push(entry);
        }
    }

    /// Last `min(n, len)` entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn all(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Rolling window of the last N snapshots in chronological order
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    snapshots: BoundedLog<Arc<MetricsSnapshot>>,
}

impl HistoryBuffer {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity("history capacity"));
        }
        Ok(Self {
            snapshots: BoundedLog::new(capacity)?,
        })
    }

    pub fn append(&mut self, snapshot: Arc<MetricsSnapshot>) {
        self.snapshots.push(snapshot);
    }

    pub fn recent(&self, n: usize) -> Vec<Arc<MetricsSnapshot>> {
        self.snapshots.recent(n)
    }

    /// Most recent snapshot, `None` until the first successful tick
    pub fn latest(&self) -> Option<Arc<MetricsSnapshot>> {
        self.snapshots.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.snapshots.capacity()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self {
            snapshots: BoundedLog {
                entries: VecDeque::with_capacity(Self::DEFAULT_CAPACITY),
                capacity: Self::DEFAULT_CAPACITY,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn snapshot_at(secs: i64) -> Arc<MetricsSnapshot> {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Arc::new(MetricsSnapshot::new(base + Duration::seconds(secs)))
    }

    #[test]
    fn test_log_never_exceeds_capacity() {
        let mut log = BoundedLog::new(3).unwrap();
        for i in 0..10 {
            log.push(i);
            assert!(log.len() <= 3);
        }
        assert_eq!(log.all(), vec![7, 8, 9]);
    }

    #[test]
    fn test_recent_is_chronological() {
        let mut log = BoundedLog::new(5).unwrap();
        log.extend(1..=4);
        assert_eq!(log.recent(2), vec![3, 4]);
        assert_eq!(log.recent(10), vec![1, 2, 3, 4]);
        assert!(log.recent(0).is_empty());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(BoundedLog::<u8>::new(0).is_err());
        assert_eq!(
            HistoryBuffer::new(0).unwrap_err(),
            ConfigError::ZeroCapacity("history capacity")
        );
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = HistoryBuffer::new(4).unwrap();
        assert!(history.latest().is_none());

        for secs in 0..9 {
            history.append(snapshot_at(secs));
        }

        assert_eq!(history.len(), 4);
        let recent = history.recent(100);
        let stamps: Vec<_> = recent.iter().map(|s| s.timestamp).collect();
        let mut sorted = stamps.clone();
        sorted.sort();
        assert_eq!(stamps, sorted);
        assert_eq!(recent[0].timestamp, snapshot_at(5).timestamp);
        assert_eq!(history.latest().unwrap().timestamp, snapshot_at(8).timestamp);
    }

    #[test]
    fn test_default_capacity() {
        let history = HistoryBuffer::default();
        assert_eq!(history.capacity(), 100);
        assert!(history.is_empty());
    }
}
