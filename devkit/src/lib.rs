/*!
# Symbion DevKit - Mocks et Harness pour le poller

Bibliothèque facilitant les tests du moteur de polling sans réseau ni matériel:
- Sink MQTT mock (enregistre les publications, simule les déconnexions)
- Transport hôte scripté (ping + fetch SNMP) avec compteurs d'appels
- Capteur scripté (échecs transitoires puis succès)
- Harness assemblant un `Scheduler` complet sur ces mocks
*/

pub mod mock_sink;
pub mod scripted;
pub mod test_utils;

pub use mock_sink::{MockMessage, MockSink};
pub use scripted::{HostScript, RecordingSignal, ScriptedSensor, ScriptedTransport};
pub use test_utils::TestHarness;
