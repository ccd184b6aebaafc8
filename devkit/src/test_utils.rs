/*!
Test Harness pour le poller Symbion

Facilite l'écriture de tests de cycles complets avec:
- Setup automatique des mocks (sink, transport, capteur, flag)
- Config de test avec timeouts courts
- Assertions sur les payloads publiés
*/

use crate::mock_sink::MockSink;
use crate::scripted::{HostScript, RecordingSignal, ScriptedSensor, ScriptedTransport};
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use symbion_poller::{PollerConfig, Scheduler, Target};
use tracing_subscriber::EnvFilter;

/// Harness de test complet: un `Scheduler` réel branché sur des mocks
pub struct TestHarness {
    pub sink: MockSink,
    pub transport: Arc<ScriptedTransport>,
    pub sensor: Arc<ScriptedSensor>,
    pub signal: Arc<RecordingSignal>,
    pub config: PollerConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        // Init logging pour tests (RUST_LOG)
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();

        let mut config = PollerConfig::default();
        config.polling.host_timeout_ms = 300;
        config.polling.sensor_timeout_ms = 2_000;
        config.polling.liveness_timeout_ms = 100;
        config.sensor.retry_delay_ms = 10;

        Self {
            sink: MockSink::new(),
            transport: Arc::new(ScriptedTransport::new()),
            sensor: Arc::new(ScriptedSensor::reading(21.5, 48.0)),
            signal: Arc::new(RecordingSignal::default()),
            config,
        }
    }

    /// Ajoute un hôte distant et son comportement
    pub fn with_host(mut self, target_id: &str, address: &str, script: HostScript) -> Self {
        self.transport.set_host(address, script);
        self.config.targets.push(Target::remote_host(target_id, address));
        self
    }

    /// Ajoute le capteur local (un seul device partagé par les cibles capteur)
    pub fn with_sensor(mut self, target_id: &str, sensor: ScriptedSensor) -> Self {
        self.sensor = Arc::new(sensor);
        self.config
            .targets
            .push(Target::local_sensor(target_id, "/sys/bus/iio/devices/iio:device0"));
        self
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::from_config(
            &self.config,
            self.transport.clone(),
            self.sensor.clone(),
            Arc::new(self.sink.clone()),
            self.signal.clone(),
        )
    }

    pub fn target_ids(&self) -> Vec<String> {
        self.config.targets.iter().map(|t| t.target_id.clone()).collect()
    }

    /// Vérifie que chaque cible a publié exactement `cycles` records
    pub fn assert_published_per_target(&self, cycles: usize) -> Result<()> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for id in self.sink.published_ids() {
            *counts.entry(id).or_insert(0) += 1;
        }

        for id in self.target_ids() {
            let actual = counts.remove(&id).unwrap_or(0);
            if actual != cycles {
                anyhow::bail!("target '{}': expected {} records, got {}", id, cycles, actual);
            }
        }
        if !counts.is_empty() {
            anyhow::bail!("records published for unknown targets: {:?}", counts.keys());
        }
        Ok(())
    }

    /// Assert qu'un champ du dernier payload d'une cible a une valeur donnée
    pub fn assert_field_equals(&self, target_id: &str, field_path: &str, expected: &Value) -> Result<()> {
        let Some(payload) = self.sink.last_payload(target_id) else {
            anyhow::bail!("no record published for {}", target_id);
        };

        match get_nested_field(&payload, field_path) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!(
                "field '{}' mismatch for {}: expected {:?}, got {:?}",
                field_path,
                target_id,
                expected,
                actual
            ),
            None => anyhow::bail!("field '{}' not found in payload of {}", field_path, target_id),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
