//! System metrics source for the performance monitor
//!
//! Provides cross-platform host sampling through sysinfo:
//! - CPU usage, load average and uptime
//! - System memory usage and the agent's own resident memory
//! - Network byte/packet totals summed over interfaces
//! - Application latency and error rate from an optional HTTP probe

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use symbion_perf::{keys, MetricSource, MetricsSnapshot, SampleError};
use sysinfo::{Networks, Pid, System};
use tracing::debug;

use crate::config::ProbeConfig;

/// Host metric source backed by a long-lived `sysinfo::System`
///
/// Keeping the same `System` between ticks lets sysinfo compute CPU usage
/// from the delta since the previous refresh.
pub struct SystemMetricSource {
    sys: Arc<Mutex<HostState>>,
    probe: Option<HttpProbe>,
}

struct HostState {
    system: System,
    networks: Networks,
    pid: Option<Pid>,
}

impl SystemMetricSource {
    pub fn new(probe: &ProbeConfig) -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            sys: Arc::new(Mutex::new(HostState {
                system,
                networks: Networks::new_with_refreshed_list(),
                pid: sysinfo::get_current_pid().ok(),
            })),
            probe: probe.url.clone().map(|url| HttpProbe::new(url, probe)),
        }
    }

    fn collect_host(state: &mut HostState) -> Result<MetricsSnapshot, SampleError> {
        let HostState { system, networks, pid } = state;
        system.refresh_cpu_usage();
        system.refresh_memory();
        networks.refresh();

        let mut snapshot = MetricsSnapshot::new(chrono::Utc::now());
        let mut set = |key: &str, value: f64| -> Result<(), SampleError> {
            let key = key.parse().map_err(|e| SampleError::source(format!("{e}")))?;
            snapshot.insert(&key, value);
            Ok(())
        };

        set(keys::CPU_USAGE_PERCENT, system.global_cpu_info().cpu_usage() as f64)?;
        set(keys::UPTIME_SECONDS, System::uptime() as f64)?;
        if cfg!(unix) {
            set(keys::LOAD_AVERAGE, System::load_average().one)?;
        }

        let total = system.total_memory();
        if total > 0 {
            let used = total.saturating_sub(system.available_memory());
            set(keys::MEMORY_USAGE_PERCENT, used as f64 / total as f64 * 100.0)?;
        }
        if let Some(pid) = *pid {
            if system.refresh_process(pid) {
                if let Some(process) = system.process(pid) {
                    set(keys::PROCESS_USED_BYTES, process.memory() as f64)?;
                }
            }
        }

        let (mut rx, mut tx, mut packets_rx, mut packets_tx) = (0u64, 0u64, 0u64, 0u64);
        for (_name, data) in networks.iter() {
            rx += data.total_received();
            tx += data.total_transmitted();
            packets_rx += data.total_packets_received();
            packets_tx += data.total_packets_transmitted();
        }
        set("network.bytes_received", rx as f64)?;
        set("network.bytes_sent", tx as f64)?;
        set("network.packets_received", packets_rx as f64)?;
        set("network.packets_sent", packets_tx as f64)?;

        Ok(snapshot)
    }
}

impl MetricSource for SystemMetricSource {
    async fn sample(&self) -> Result<MetricsSnapshot, SampleError> {
        debug!("Collecting system metrics...");

        let sys = Arc::clone(&self.sys);
        let mut snapshot = tokio::task::spawn_blocking(move || Self::collect_host(&mut sys.lock()))
            .await
            .map_err(|e| SampleError::source(format!("metrics task failed: {e}")))??;

        if let Some(probe) = &self.probe {
            probe.measure(&mut snapshot).await?;
        }
        Ok(snapshot)
    }
}

/// Times one GET per tick against a configured endpoint
struct HttpProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    outcomes: Mutex<ProbeWindow>,
}

/// Rolling record of probe successes for the error rate
struct ProbeWindow {
    results: VecDeque<bool>,
    capacity: usize,
    last_probe: Option<Instant>,
}

impl ProbeWindow {
    fn new(capacity: usize) -> Self {
        Self {
            results: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            last_probe: None,
        }
    }

    /// Records the outcome; returns (error rate %, probes per second since last)
    fn record(&mut self, ok: bool, now: Instant) -> (f64, Option<f64>) {
        if self.results.len() == self.capacity {
            self.results.pop_front();
        }
        self.results.push_back(ok);

        let failures = self.results.iter().filter(|ok| !**ok).count();
        let error_rate = failures as f64 / self.results.len() as f64 * 100.0;

        let rate = self.last_probe.map(|last| {
            let secs = now.duration_since(last).as_secs_f64();
            if secs > 0.0 { 1.0 / secs } else { 0.0 }
        });
        self.last_probe = Some(now);
        (error_rate, rate)
    }
}

impl HttpProbe {
    fn new(url: String, config: &ProbeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout: Duration::from_millis(config.timeout_ms),
            outcomes: Mutex::new(ProbeWindow::new(config.window)),
        }
    }

    async fn measure(&self, snapshot: &mut MetricsSnapshot) -> Result<(), SampleError> {
        let started = Instant::now();
        let ok = match self.client.get(&self.url).timeout(self.timeout).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Probe to {} failed: {}", self.url, e);
                false
            }
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let (error_rate, rate) = self.outcomes.lock().record(ok, Instant::now());

        let mut set = |key: &str, value: f64| -> Result<(), SampleError> {
            let key = key.parse().map_err(|e| SampleError::source(format!("{e}")))?;
            snapshot.insert(&key, value);
            Ok(())
        };
        set(keys::RESPONSE_TIME_MS, elapsed_ms)?;
        set(keys::ERROR_RATE_PERCENT, error_rate)?;
        if let Some(rate) = rate {
            set(keys::REQUESTS_PER_SECOND, rate)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_collection() {
        let source = SystemMetricSource::new(&ProbeConfig::default());
        let snapshot = source.sample().await.unwrap();

        assert!(snapshot.value(keys::UPTIME_SECONDS).unwrap() > 0.0);
        let memory = snapshot.value(keys::MEMORY_USAGE_PERCENT).unwrap();
        assert!((0.0..=100.0).contains(&memory));
        assert!(snapshot.value(keys::CPU_USAGE_PERCENT).is_some());
        assert!(snapshot.value(keys::RESPONSE_TIME_MS).is_none());
    }

    #[test]
    fn test_probe_window_error_rate() {
        let mut window = ProbeWindow::new(4);
        let start = Instant::now();

        let (rate, per_sec) = window.record(true, start);
        assert_eq!(rate, 0.0);
        assert!(per_sec.is_none());

        let (rate, per_sec) = window.record(false, start + Duration::from_secs(2));
        assert_eq!(rate, 50.0);
        assert_eq!(per_sec, Some(0.5));

        for i in 0..4 {
            window.record(true, start + Duration::from_secs(3 + i));
        }
        // the failure has been evicted
        let (rate, _) = window.record(true, start + Duration::from_secs(10));
        assert_eq!(rate, 0.0);
    }

    #[tokio::test]
    async fn test_unreachable_probe_counts_as_error() {
        let probe = HttpProbe::new(
            "http://127.0.0.1:9/unreachable".to_string(),
            &ProbeConfig { timeout_ms: 200, ..ProbeConfig::default() },
        );
        let mut snapshot = MetricsSnapshot::new(chrono::Utc::now());
        probe.measure(&mut snapshot).await.unwrap();
        assert_eq!(snapshot.value(keys::ERROR_RATE_PERCENT), Some(100.0));
        assert!(snapshot.value(keys::RESPONSE_TIME_MS).is_some());
    }
}
