/*!
# Symbion DevKit - Fakes et utilitaires de test pour symbion-perf

Bibliothèque facilitant les tests du moteur de performance avec:
- Sources de métriques scriptées (valeurs, pannes, blocages)
- Exécuteur d'actions enregistreur
- Stub MQTT pour tester la publication sans broker
- Harness de test autour d'un `Monitor`
*/

pub mod fakes;
pub mod mqtt_stub;
pub mod test_utils;

pub use fakes::{RecordingExecutor, ScriptedSource, SnapshotBuilder};
pub use mqtt_stub::{MockMessage, MockMqttClient};
pub use test_utils::{init_test_logging, MonitorHarness};
