/*!
Mock du sink MQTT pour tests sans broker

Enregistre chaque record publié (topic, payload JSON, instant) et permet de
simuler une déconnexion du broker puis des reconnexions réussies ou non.
*/

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use symbion_poller::config::TopicConfig;
use symbion_poller::normalize::Record;
use symbion_poller::sink::{PublishSink, SinkError};
use symbion_poller::TargetKind;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub target_id: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub at: Instant,
}

impl MockMessage {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.payload).unwrap()
    }
}

#[derive(Debug)]
struct SinkState {
    connected: bool,
    reconnect_script: VecDeque<bool>,
    reconnect_calls: usize,
    messages: Vec<MockMessage>,
}

/// Clonable handle; every clone shares the same recorded state
#[derive(Clone)]
pub struct MockSink {
    topics: TopicConfig,
    state: Arc<Mutex<SinkState>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            topics: TopicConfig::default(),
            state: Arc::new(Mutex::new(SinkState {
                connected: true,
                reconnect_script: VecDeque::new(),
                reconnect_calls: 0,
                messages: Vec::new(),
            })),
        }
    }

    /// Simule la perte du broker: les publications échouent jusqu'à une reconnexion
    pub fn disconnect(&self) {
        self.state.lock().unwrap().connected = false;
    }

    /// Résultats des prochains `reconnect()`; une fois épuisé, reconnect réussit
    pub fn script_reconnects(&self, results: &[bool]) {
        self.state
            .lock()
            .unwrap()
            .reconnect_script
            .extend(results.iter().copied());
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    pub fn reconnect_calls(&self) -> usize {
        self.state.lock().unwrap().reconnect_calls
    }

    pub fn published(&self) -> Vec<MockMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    /// Target ids in publish order
    pub fn published_ids(&self) -> Vec<String> {
        self.published().into_iter().map(|m| m.target_id).collect()
    }

    pub fn messages_for(&self, target_id: &str) -> Vec<MockMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.target_id == target_id)
            .collect()
    }

    pub fn messages_on(&self, topic: &str) -> Vec<MockMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.topic == topic)
            .collect()
    }

    /// Dernier payload JSON publié pour une cible
    pub fn last_payload(&self, target_id: &str) -> Option<Value> {
        self.messages_for(target_id).last().map(MockMessage::json)
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublishSink for MockSink {
    async fn publish(&self, target_id: &str, record: &Record) -> Result<(), SinkError> {
        let payload = record.to_json()?;
        let topic = match record.kind {
            TargetKind::RemoteHost => self.topics.hosts.clone(),
            TargetKind::LocalSensor => self.topics.sensor.clone(),
        };

        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(SinkError::Disconnected("mock broker down".into()));
        }
        state.messages.push(MockMessage {
            target_id: target_id.to_string(),
            topic: topic.clone(),
            payload,
            at: Instant::now(),
        });
        tracing::debug!("📤 [MOCK] published {} to {}", target_id, topic);
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock().unwrap();
        state.reconnect_calls += 1;
        if state.reconnect_script.pop_front().unwrap_or(true) {
            state.connected = true;
            Ok(())
        } else {
            Err(SinkError::ReconnectFailed("mock broker refused connection".into()))
        }
    }
}
