/*!
Test Harness pour le moteur de performance

Facilite l'écriture de tests de bout en bout avec:
- Un `Monitor` branché sur une source scriptée et un exécuteur enregistreur
- La collecte des événements diffusés
- Des assertions sur les alertes et optimisations produites
*/

use crate::fakes::{RecordingExecutor, ScriptedSource};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use symbion_perf::{AlertSeverity, EngineConfig, EventReceiver, Monitor, MonitorEvent, TickOutcome};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};

pub type HarnessMonitor = Monitor<Arc<ScriptedSource>, Arc<RecordingExecutor>>;

/// Init logging pour tests (`RUST_LOG` respecté, idempotent)
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "symbion_perf=debug,symbion_devkit=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Harness de test autour d'un monitor
pub struct MonitorHarness {
    pub monitor: HarnessMonitor,
    pub source: Arc<ScriptedSource>,
    pub executor: Arc<RecordingExecutor>,
    events: EventReceiver,
    collected: Vec<MonitorEvent>,
}

impl MonitorHarness {
    /// Crée un harness avec une source scriptée vide et un exécuteur qui applique tout
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_parts(ScriptedSource::new(), RecordingExecutor::new(), config)
    }

    pub fn with_parts(source: ScriptedSource, executor: RecordingExecutor, config: EngineConfig) -> Result<Self> {
        init_test_logging();

        let source = Arc::new(source);
        let executor = Arc::new(executor);
        let monitor = Monitor::new(Arc::clone(&source), Arc::clone(&executor), config)?;
        let events = monitor.subscribe();

        Ok(Self {
            monitor,
            source,
            executor,
            events,
            collected: Vec::new(),
        })
    }

    /// Exécute `n` ticks manuels à la suite
    pub async fn tick_n(&self, n: usize) -> Vec<TickOutcome> {
        let mut outcomes = Vec::with_capacity(n);
        for _ in 0..n {
            outcomes.push(self.monitor.tick().await);
        }
        outcomes
    }

    /// Récupère les événements reçus depuis le dernier appel
    pub fn drain_events(&mut self) -> Vec<MonitorEvent> {
        let start = self.collected.len();
        loop {
            match self.events.try_recv() {
                Ok(event) => self.collected.push(event),
                Err(TryRecvError::Lagged(missed)) => warn!("Harness lagged, {} events lost", missed),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        self.collected[start..].to_vec()
    }

    /// Noms de tous les événements reçus depuis la création du harness
    pub fn event_names(&mut self) -> Vec<&'static str> {
        self.drain_events();
        self.collected.iter().map(MonitorEvent::name).collect()
    }

    /// Assert sur le nombre d'alertes d'une sévérité donnée
    pub fn assert_alert_count(&self, severity: AlertSeverity, expected: usize) -> Result<()> {
        let actual = self.monitor.alerts().iter().filter(|a| a.severity == severity).count();
        if actual != expected {
            anyhow::bail!("Expected {} {:?} alerts, got {}", expected, severity, actual);
        }
        info!("{} {:?} alerts as expected", actual, severity);
        Ok(())
    }

    /// Nombre d'optimisations enregistrées par type d'action
    pub fn optimization_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for record in self.monitor.optimizations() {
            *counts.entry(record.action_type.to_string()).or_insert(0) += 1;
        }
        counts
    }
}
