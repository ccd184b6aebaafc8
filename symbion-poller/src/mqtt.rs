//! MQTT publish sink (rumqttc)
//!
//! The event loop runs in its own task and reports the connection state
//! through a watch channel. rumqttc reconnects on the next `poll()` after an
//! error, so `reconnect()` only has to wait for a fresh CONNACK.
//! All publishes go through the `AsyncClient` request channel, which
//! serializes concurrent callers onto the single connection.

use crate::config::{MqttConfig, TopicConfig};
use crate::normalize::Record;
use crate::sink::{PublishSink, SinkError};
use crate::target::TargetKind;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct MqttSink {
    client: AsyncClient,
    topics: TopicConfig,
    connected: watch::Receiver<bool>,
    connect_timeout: Duration,
    event_loop: JoinHandle<()>,
}

impl MqttSink {
    /// Connect to the broker and wait for the first CONNACK
    pub async fn connect(config: &MqttConfig) -> Result<Self, SinkError> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, 64);
        let (state_tx, state_rx) = watch::channel(false);
        let retry_delay = Duration::from_secs(config.retry_delay_secs);
        let event_loop = tokio::spawn(drive_event_loop(eventloop, state_tx, retry_delay));

        let sink = Self {
            client,
            topics: config.topics.clone(),
            connected: state_rx,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            event_loop,
        };
        sink.wait_connected().await?;
        info!(host = %config.host, port = config.port, "connected to MQTT broker");
        Ok(sink)
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    fn topic_for(&self, kind: TargetKind) -> &str {
        match kind {
            TargetKind::RemoteHost => &self.topics.hosts,
            TargetKind::LocalSensor => &self.topics.sensor,
        }
    }

    async fn wait_connected(&self) -> Result<(), SinkError> {
        let mut state = self.connected.clone();
        let outcome = tokio::time::timeout(self.connect_timeout, state.wait_for(|up| *up)).await;
        match outcome {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(SinkError::ReconnectFailed("MQTT event loop stopped".into())),
            Err(_) => Err(SinkError::ReconnectFailed(format!(
                "no CONNACK within {}s",
                self.connect_timeout.as_secs()
            ))),
        }
    }

    /// Flush queued publishes with a clean DISCONNECT
    pub async fn close(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "disconnect request not queued");
            return;
        }
        let mut state = self.connected.clone();
        let _ = tokio::time::timeout(self.connect_timeout, state.wait_for(|up| !*up)).await;
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

async fn drive_event_loop(mut eventloop: EventLoop, state: watch::Sender<bool>, retry_delay: Duration) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                debug!(code = ?ack.code, "CONNACK received");
                state.send_replace(true);
            }
            Ok(Event::Incoming(Incoming::Disconnect)) => {
                warn!("broker sent DISCONNECT");
                state.send_replace(false);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                state.send_replace(false);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                if state.send_replace(false) {
                    warn!(error = %e, "MQTT connection lost");
                } else {
                    debug!(error = %e, "MQTT connection attempt failed");
                }
                tokio::time::sleep(retry_delay).await;
            }
        }
    }
}

#[async_trait]
impl PublishSink for MqttSink {
    async fn publish(&self, target_id: &str, record: &Record) -> Result<(), SinkError> {
        if !self.is_connected() {
            return Err(SinkError::Disconnected("no active broker connection".into()));
        }

        let payload = record.to_json()?;
        let topic = self.topic_for(record.kind);
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| SinkError::Disconnected(e.to_string()))?;

        debug!(%target_id, %topic, "record published");
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), SinkError> {
        if self.is_connected() {
            return Ok(());
        }
        info!("waiting for MQTT broker reconnection");
        self.wait_connected().await
    }
}
