//! Poller configuration (YAML)
//!
//! Loaded once at startup from `SYMBION_POLLER_CONFIG` (default `poller.yaml`).
//! Every section has defaults so a partial file is enough.

use crate::prober::{ProberSettings, DEFAULT_HOT_THRESHOLD_C};
use crate::source::SourceSettings;
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const CONFIG_PATH_ENV: &str = "SYMBION_POLLER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "poller.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub mqtt: MqttConfig,
    pub polling: PollingConfig,
    pub sensor: SensorConfig,
    pub snmp: SnmpConfig,
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Bound on the wait for CONNACK, at startup and on each reconnect
    pub connect_timeout_secs: u64,
    /// Pause between two connection attempts of the event loop
    pub retry_delay_secs: u64,
    pub topics: TopicConfig,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "symbion-poller".into(),
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            retry_delay_secs: 2,
            topics: TopicConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub hosts: String,
    pub sensor: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            hosts: "/home/snmp".into(),
            sensor: "/sensor/data".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub host_timeout_ms: u64,
    pub sensor_timeout_ms: u64,
    pub liveness_timeout_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            host_timeout_ms: 5_000,
            sensor_timeout_ms: 15_000,
            liveness_timeout_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub attempts: u32,
    pub retry_delay_ms: u64,
    pub hot_threshold_c: f64,
    pub flag_path: PathBuf,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            retry_delay_ms: 2_000,
            hot_threshold_c: DEFAULT_HOT_THRESHOLD_C,
            flag_path: PathBuf::from("/tmp/temperature_flag_pipe"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnmpConfig {
    pub community: String,
    pub port: u16,
    pub timeout_ms: u64,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            community: "public".into(),
            port: 161,
            timeout_ms: 3_000,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl SnmpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl PollerConfig {
    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            liveness_timeout: Duration::from_millis(self.polling.liveness_timeout_ms),
            sensor_attempts: self.sensor.attempts,
            sensor_retry_delay: Duration::from_millis(self.sensor.retry_delay_ms),
            ..SourceSettings::default()
        }
    }

    pub fn prober_settings(&self) -> ProberSettings {
        ProberSettings {
            host_timeout: Duration::from_millis(self.polling.host_timeout_ms),
            sensor_timeout: Duration::from_millis(self.polling.sensor_timeout_ms),
            hot_threshold_c: self.sensor.hot_threshold_c,
        }
    }

    pub fn has_sensor(&self) -> bool {
        self.targets.iter().any(|t| t.kind == crate::target::TargetKind::LocalSensor)
    }

    /// `SYMBION_MQTT_HOST` / `SYMBION_MQTT_PORT` take precedence over the file
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("SYMBION_MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup("SYMBION_MQTT_PORT") {
            match port.parse() {
                Ok(port) => self.mqtt.port = port,
                Err(_) => warn!(value = %port, "ignoring invalid SYMBION_MQTT_PORT"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::Invalid("no targets configured".into()));
        }
        if self.polling.interval_secs == 0 {
            return Err(ConfigError::Invalid("polling.interval_secs must be positive".into()));
        }
        if (1..5).contains(&self.mqtt.keep_alive_secs) {
            return Err(ConfigError::Invalid("mqtt.keep_alive_secs must be 0 or at least 5".into()));
        }
        if self.sensor.attempts == 0 {
            return Err(ConfigError::Invalid("sensor.attempts must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.target_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "target at {} has an empty target_id",
                    target.address
                )));
            }
            // the address ends up as a `ping` argument
            if target.address.trim().is_empty() || target.address.starts_with('-') {
                return Err(ConfigError::Invalid(format!(
                    "target {} has an invalid address {:?}",
                    target.target_id, target.address
                )));
            }
            if !seen.insert(target.target_id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate target_id {}",
                    target.target_id
                )));
            }
        }
        Ok(())
    }
}

/// Reads, overrides from the environment, validates
pub async fn load_config() -> Result<PollerConfig, ConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = load_from(&path).await?;
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// A missing file yields defaults; an empty one too
pub async fn load_from(path: impl AsRef<Path>) -> Result<PollerConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(PollerConfig::default());
    }

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    if text.trim().is_empty() {
        return Ok(PollerConfig::default());
    }

    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
