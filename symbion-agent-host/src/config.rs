//! Agent configuration
//!
//! Handles:
//! - Engine tunables and alert thresholds (`[engine]`)
//! - MQTT broker settings and report cadence (`[mqtt]`)
//! - Shell commands backing optimization actions (`[actions]`)
//! - Optional HTTP probe feeding application metrics (`[probe]`)
//! - Cross-platform storage location

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use symbion_perf::EngineConfig;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "SYMBION_PERF_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub engine: EngineConfig,
    pub mqtt: MqttConfig,
    /// Action type -> shell command (e.g. `force_gc = "sync"`)
    pub actions: BTreeMap<String, String>,
    pub probe: ProbeConfig,
    pub agent: AgentInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub base_topic: String,
    pub report_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Endpoint whose latency and failures become application metrics
    pub url: Option<String>,
    pub timeout_ms: u64,
    /// Number of recent probes the error rate is computed over
    pub window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentInfo {
    pub agent_id: String,
    pub hostname: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1883,
            client_id: None,
            keep_alive_secs: 30,
            base_topic: "symbion/perf".to_string(),
            report_interval_secs: 60,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 1500,
            window: 20,
        }
    }
}

impl Default for AgentInfo {
    fn default() -> Self {
        Self {
            agent_id: uuid::Uuid::new_v4().simple().to_string(),
            hostname: hostname::get().unwrap_or_default().to_string_lossy().to_string(),
        }
    }
}

impl AgentConfig {
    /// Load config from `$SYMBION_PERF_CONFIG` or the OS-specific location
    ///
    /// A missing file means defaults.
    pub async fn load() -> Result<Self> {
        Self::load_from(&Self::active_path()?).await
    }

    /// Path honoured by [`load`](Self::load)
    pub fn active_path() -> Result<PathBuf> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Ok(PathBuf::from(path)),
            None => Self::config_file_path(),
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Save config to `path`, creating parent directories
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("symbion-perf");
        path.push("config.toml");
        Ok(path)
    }

    pub fn mqtt_client_id(&self) -> String {
        self.mqtt
            .client_id
            .clone()
            .unwrap_or_else(|| format!("symbion-perf-{}", self.agent.agent_id))
    }
}
