//! Symbion Agent Host - adaptive performance monitoring agent
//!
//! This agent runs the Symbion performance engine on the local host:
//! - Periodic sampling of CPU, memory, network and probe metrics
//! - Threshold alerts, health score and bottleneck reports
//! - Corrective actions through configured shell hooks
//! - Event and report publication over MQTT
//!
//! `symbion-agent-host --once` runs a single tick and prints the report.
//! `symbion-agent-host --init` writes the effective configuration to disk.

mod config;
mod execution;
mod metrics;
mod publisher;

use anyhow::{Context, Result};
use config::AgentConfig;
use execution::ShellActionExecutor;
use metrics::SystemMetricSource;
use publisher::PerfPublisher;
use rumqttc::{AsyncClient, Event, MqttOptions};
use std::time::Duration;
use symbion_perf::{Monitor, MonitorEvent, TickOutcome};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

type HostMonitor = Monitor<SystemMetricSource, ShellActionExecutor>;

/// Main agent state
struct Agent {
    config: AgentConfig,
    monitor: HostMonitor,
    publisher: Option<PerfPublisher<AsyncClient>>,
}

impl Agent {
    /// Create new agent instance
    fn new(config: AgentConfig) -> Result<Self> {
        info!(
            "Initializing Symbion Agent Host v{} ({})",
            env!("CARGO_PKG_VERSION"),
            config.agent.hostname
        );

        let source = SystemMetricSource::new(&config.probe);
        let executor = ShellActionExecutor::new(config.actions.clone(), config.engine.action_timeout());
        let configured = executor.configured_actions();
        if configured.is_empty() {
            info!("No action hooks configured, optimizations will be skipped");
        } else {
            info!("Action hooks: {:?}", configured);
        }

        let monitor = Monitor::new(source, executor, config.engine.clone())
            .context("Invalid engine configuration")?;

        Ok(Agent {
            config,
            monitor,
            publisher: None,
        })
    }

    /// Configure the MQTT client and start its event loop in the background
    fn connect_mqtt(&mut self) {
        if !self.config.mqtt.enabled {
            info!("MQTT publication disabled");
            return;
        }

        let mqtt = &self.config.mqtt;
        let mut mqtt_options = MqttOptions::new(self.config.mqtt_client_id(), &mqtt.broker_host, mqtt.broker_port);
        mqtt_options.set_keep_alive(Duration::from_secs(mqtt.keep_alive_secs.max(5)));
        mqtt_options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(incoming)) => debug!("MQTT incoming: {:?}", incoming),
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT connection error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        info!("Publishing to {}:{} under {}", mqtt.broker_host, mqtt.broker_port, mqtt.base_topic);
        self.publisher = Some(PerfPublisher::new(
            client,
            &mqtt.base_topic,
            &self.config.agent.agent_id,
            &self.config.agent.hostname,
        ));
    }

    /// Start the monitor and relay its events until Ctrl-C
    async fn run(&mut self) -> Result<()> {
        info!("Starting agent main loop...");

        let mut events = self.monitor.subscribe();
        self.monitor.start_default().context("Failed to start monitor")?;

        let report_every = Duration::from_secs(self.config.mqtt.report_interval_secs.max(1));
        let mut report_timer = interval(report_every);
        report_timer.tick().await; // skip the immediate first tick

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(RecvError::Lagged(missed)) => warn!("Event relay lagged, {} events dropped", missed),
                    Err(RecvError::Closed) => break,
                },

                _ = report_timer.tick() => {
                    if let Err(e) = self.publish_report().await {
                        error!("Failed to publish report: {:#}", e);
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.monitor.stop();
        if let Err(e) = self.publish_report().await {
            warn!("Failed to publish final report: {:#}", e);
        }
        Ok(())
    }

    async fn handle_event(&self, event: MonitorEvent) {
        match &event {
            MonitorEvent::SnapshotCollected { health_score, .. } => debug!("Health score: {:.1}", health_score),
            MonitorEvent::AlertsRaised { alerts } => {
                for alert in alerts {
                    warn!("[{:?}] {}", alert.severity, alert.message);
                }
            }
            MonitorEvent::OptimizationsApplied { records } => {
                for record in records {
                    info!("Optimization applied: {}", record.action);
                }
            }
            MonitorEvent::Error { message } => warn!("Tick failed: {}", message),
            MonitorEvent::Started { .. } | MonitorEvent::Stopped => info!("Monitor {}", event.name()),
        }

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish_event(&event).await {
                error!("Failed to publish {} event: {:#}", event.name(), e);
            }
        }
    }

    async fn publish_report(&self) -> Result<()> {
        let Some(publisher) = &self.publisher else {
            return Ok(());
        };
        let report = self.monitor.report();
        publisher.publish_report(&report).await?;
        debug!("Report published (score {:.1})", report.summary.health_score);
        Ok(())
    }

    /// Run a single tick and print the report as JSON
    async fn run_once(&self) -> Result<()> {
        if let TickOutcome::Failed(e) = self.monitor.tick().await {
            warn!("Sampling failed: {}", e);
        }
        let report = serde_json::to_string_pretty(&self.monitor.report())
            .context("Failed to serialize report")?;
        println!("{report}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "symbion_agent_host=info,symbion_perf=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let once = args.iter().any(|arg| arg == "--once");

    let config = AgentConfig::load().await.context("Failed to load configuration")?;

    if args.iter().any(|arg| arg == "--init") {
        let path = AgentConfig::active_path()?;
        config.save(&path).await.context("Failed to save configuration")?;
        info!("Configuration written to {}", path.display());
        return Ok(());
    }

    let mut agent = Agent::new(config).context("Failed to create agent")?;

    if once {
        return agent.run_once().await;
    }

    info!("Symbion Agent Host starting...");
    agent.connect_mqtt();
    agent.run().await.context("Agent execution failed")?;

    Ok(())
}
