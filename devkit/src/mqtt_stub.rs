/*!
Mock MQTT Client pour développement sans broker

Permet de tester la publication des événements et rapports de performance
sans démarrer un broker MQTT réel. Enregistre tous les messages publiés.
*/

use anyhow::Result;
use parking_lot::Mutex;
use rumqttc::QoS;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Mock MQTT Client qui simule la publication de rumqttc::AsyncClient
#[derive(Clone, Default)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simule la publication d'un message (compatible avec AsyncClient)
    pub async fn publish<S, V>(&self, topic: S, qos: QoS, retain: bool, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        };

        debug!("[MOCK] Published to {}: {} bytes", message.topic, message.payload.len());
        self.published_messages.lock().push(message);
        Ok(())
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().clone()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.find_messages_by_topic(topic).last() {
            Some(last_msg) => Ok(Some(serde_json::from_slice(&last_msg.payload)?)),
            None => Ok(None),
        }
    }

    /// Reset tous les messages enregistrés
    pub fn clear(&self) {
        self.published_messages.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_publish() {
        let client = MockMqttClient::new();

        let payload = b"test message";
        client.publish("symbion/perf/stopped@v1", QoS::AtLeastOnce, false, payload.to_vec()).await.unwrap();

        let messages = client.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "symbion/perf/stopped@v1");
        assert_eq!(messages[0].payload, payload);
        assert_eq!(messages[0].qos, QoS::AtLeastOnce);

        client.clear();
        assert!(client.get_published_messages().is_empty());
    }

    #[tokio::test]
    async fn test_json_message_parsing() {
        let client = MockMqttClient::new();

        for score in [90.0, 72.5] {
            let payload = serde_json::to_vec(&serde_json::json!({ "health_score": score })).unwrap();
            client.publish("symbion/perf/report@v1", QoS::AtLeastOnce, false, payload).await.unwrap();
        }

        let parsed: Option<serde_json::Value> = client.get_last_json_message("symbion/perf/report@v1").unwrap();
        assert_eq!(parsed.unwrap()["health_score"], 72.5);
        assert!(client.get_last_json_message::<serde_json::Value>("other").unwrap().is_none());
    }
}
