//! Metric snapshots
//!
//! A snapshot is one point-in-time capture of every monitored metric, grouped
//! by domain. Metric sources build it, the monitor wraps it in an `Arc` when it
//! enters the history buffer and nobody mutates it afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Well-known metric keys supplied by metric sources
pub mod keys {
    pub const CPU_USAGE_PERCENT: &str = "system.cpu_usage_percent";
    pub const LOAD_AVERAGE: &str = "system.load_average";
    pub const UPTIME_SECONDS: &str = "system.uptime_seconds";
    pub const RESPONSE_TIME_MS: &str = "application.response_time_ms";
    pub const REQUESTS_PER_SECOND: &str = "application.requests_per_second";
    pub const ERROR_RATE_PERCENT: &str = "application.error_rate_percent";
    pub const PROCESS_USED_BYTES: &str = "memory.process_used_bytes";
    pub const MEMORY_USAGE_PERCENT: &str = "memory.system_usage_percent";
    pub const DB_QUERY_TIME_MS: &str = "database.query_time_ms";
}

/// Metric domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricDomain {
    System,
    Application,
    Memory,
    Network,
    Database,
    Custom,
}

impl MetricDomain {
    pub const ALL: [MetricDomain; 6] = [
        MetricDomain::System,
        MetricDomain::Application,
        MetricDomain::Memory,
        MetricDomain::Network,
        MetricDomain::Database,
        MetricDomain::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricDomain::System => "system",
            MetricDomain::Application => "application",
            MetricDomain::Memory => "memory",
            MetricDomain::Network => "network",
            MetricDomain::Database => "database",
            MetricDomain::Custom => "custom",
        }
    }
}

impl FromStr for MetricDomain {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricDomain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidMetricKey(s.to_string()))
    }
}

/// Fully qualified metric key, `<domain>.<name>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MetricKey {
    domain: MetricDomain,
    name: String,
}

impl MetricKey {
    pub fn new<S: Into<String>>(domain: MetricDomain, name: S) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::InvalidMetricKey(format!("{}.", domain.as_str())));
        }
        Ok(Self { domain, name })
    }

    pub fn domain(&self) -> MetricDomain {
        self.domain
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for MetricKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidMetricKey(s.to_string());
        let (domain, name) = s.split_once('.').ok_or_else(invalid)?;
        let domain = domain.parse::<MetricDomain>().map_err(|_| invalid())?;
        MetricKey::new(domain, name).map_err(|_| invalid())
    }
}

impl TryFrom<String> for MetricKey {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MetricKey> for String {
    fn from(key: MetricKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain.as_str(), self.name)
    }
}

/// Immutable, timestamped capture of all monitored metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub system: BTreeMap<String, f64>,
    #[serde(default)]
    pub application: BTreeMap<String, f64>,
    #[serde(default)]
    pub memory: BTreeMap<String, f64>,
    #[serde(default)]
    pub network: BTreeMap<String, f64>,
    #[serde(default)]
    pub database: BTreeMap<String, f64>,
    #[serde(default)]
    pub custom: BTreeMap<String, f64>,
}

impl MetricsSnapshot {
    /// Empty snapshot taken at `timestamp`
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            system: BTreeMap::new(),
            application: BTreeMap::new(),
            memory: BTreeMap::new(),
            network: BTreeMap::new(),
            database: BTreeMap::new(),
            custom: BTreeMap::new(),
        }
    }

    pub fn domain(&self, domain: MetricDomain) -> &BTreeMap<String, f64> {
        match domain {
            MetricDomain::System => &self.system,
            MetricDomain::Application => &self.application,
            MetricDomain::Memory => &self.memory,
            MetricDomain::Network => &self.network,
            MetricDomain::Database => &self.database,
            MetricDomain::Custom => &self.custom,
        }
    }

    fn domain_mut(&mut self, domain: MetricDomain) -> &mut BTreeMap<String, f64> {
        match domain {
            MetricDomain::System => &mut self.system,
            MetricDomain::Application => &mut self.application,
            MetricDomain::Memory => &mut self.memory,
            MetricDomain::Network => &mut self.network,
            MetricDomain::Database => &mut self.database,
            MetricDomain::Custom => &mut self.custom,
        }
    }

    /// Record a value while the snapshot is still being assembled
    pub fn insert(&mut self, key: &MetricKey, value: f64) {
        self.domain_mut(key.domain()).insert(key.name().to_string(), value);
    }

    /// Builder-style variant of [`insert`](Self::insert) taking a `<domain>.<name>` string
    pub fn with(mut self, key: &str, value: f64) -> Result<Self, ConfigError> {
        let key = key.parse::<MetricKey>()?;
        self.insert(&key, value);
        Ok(self)
    }

    pub fn get(&self, key: &MetricKey) -> Option<f64> {
        self.domain(key.domain()).get(key.name()).copied()
    }

    /// Lookup by `<domain>.<name>` string; unparseable keys read as missing
    pub fn value(&self, key: &str) -> Option<f64> {
        key.parse::<MetricKey>().ok().and_then(|k| self.get(&k))
    }

    pub fn metric_count(&self) -> usize {
        MetricDomain::ALL.iter().map(|d| self.domain(*d).len()).sum()
    }
}
