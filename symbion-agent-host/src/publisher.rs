//! MQTT publication of monitor events and reports
//!
//! Topics (under the configured base, `symbion/perf` by default):
//! - `<base>/<event>@v1` for every monitor event
//! - `<base>/report@v1` for periodic reports

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use std::future::Future;
use symbion_perf::{MonitorEvent, Report};

/// Minimal publish seam so tests can swap the broker client
pub trait Publish: Send + Sync {
    fn publish_bytes(&self, topic: String, payload: Vec<u8>) -> impl Future<Output = Result<()>> + Send;
}

impl Publish for AsyncClient {
    async fn publish_bytes(&self, topic: String, payload: Vec<u8>) -> Result<()> {
        self.publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .context("Failed to publish MQTT message")
    }
}

/// Envelope shared by every perf message
#[derive(Debug, Serialize)]
struct PerfMessage<'a, T: Serialize> {
    agent_id: &'a str,
    hostname: &'a str,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    body: &'a T,
}

pub struct PerfPublisher<P> {
    client: P,
    base_topic: String,
    agent_id: String,
    hostname: String,
}

impl<P: Publish> PerfPublisher<P> {
    pub fn new(client: P, base_topic: &str, agent_id: &str, hostname: &str) -> Self {
        Self {
            client,
            base_topic: base_topic.trim_end_matches('/').to_string(),
            agent_id: agent_id.to_string(),
            hostname: hostname.to_string(),
        }
    }

    pub fn event_topic(&self, event: &MonitorEvent) -> String {
        format!("{}/{}@v1", self.base_topic, event.name())
    }

    pub fn report_topic(&self) -> String {
        format!("{}/report@v1", self.base_topic)
    }

    pub async fn publish_event(&self, event: &MonitorEvent) -> Result<()> {
        let payload = self.encode(event).context("Failed to serialize event")?;
        self.client.publish_bytes(self.event_topic(event), payload).await
    }

    pub async fn publish_report(&self, report: &Report) -> Result<()> {
        let payload = self.encode(report).context("Failed to serialize report")?;
        self.client.publish_bytes(self.report_topic(), payload).await
    }

    fn encode<T: Serialize>(&self, body: &T) -> Result<Vec<u8>> {
        let message = PerfMessage {
            agent_id: &self.agent_id,
            hostname: &self.hostname,
            timestamp: Utc::now(),
            body,
        };
        Ok(serde_json::to_vec(&message)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbion_devkit::MockMqttClient;
    use symbion_perf::{EngineConfig, HistoryBuffer, BoundedLog, ReportBuilder, ThresholdConfig};

    impl Publish for MockMqttClient {
        async fn publish_bytes(&self, topic: String, payload: Vec<u8>) -> Result<()> {
            self.publish(topic, QoS::AtLeastOnce, false, payload).await
        }
    }

    fn publisher() -> PerfPublisher<MockMqttClient> {
        PerfPublisher::new(MockMqttClient::new(), "symbion/perf/", "agent-1", "host-a")
    }

    #[tokio::test]
    async fn test_event_published_on_named_topic() {
        let publisher = publisher();
        publisher
            .publish_event(&MonitorEvent::Error { message: "sensor offline".into() })
            .await
            .unwrap();

        let message: serde_json::Value = publisher
            .client
            .get_last_json_message("symbion/perf/error@v1")
            .unwrap()
            .unwrap();
        assert_eq!(message["event"], "error");
        assert_eq!(message["message"], "sensor offline");
        assert_eq!(message["agent_id"], "agent-1");
        assert_eq!(message["hostname"], "host-a");
    }

    #[tokio::test]
    async fn test_report_published() {
        let publisher = publisher();
        let report = ReportBuilder::new(&EngineConfig::default()).build(
            &HistoryBuffer::default(),
            &BoundedLog::new(1).unwrap(),
            &BoundedLog::new(1).unwrap(),
            &ThresholdConfig::default(),
            Utc::now(),
        );
        publisher.publish_report(&report).await.unwrap();

        let messages = publisher.client.find_messages_by_topic("symbion/perf/report@v1");
        assert_eq!(messages.len(), 1);
        let json: serde_json::Value = serde_json::from_slice(&messages[0].payload).unwrap();
        assert_eq!(json["summary"]["health_score"], 0.0);
        assert!(json["current_snapshot"].is_null());
    }
}
