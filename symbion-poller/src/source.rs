//! Metric source adapter
//!
//! Uniform `probe(target)` over the two kinds of sources:
//! - Local sensor: blocking device read, retried a fixed number of times
//! - Remote host: liveness check first, then one batched metric fetch
//!
//! Transports are abstract capabilities so tests (and other protocols) can
//! stand in for ping/SNMP and the IIO driver.

use crate::reading::{MetricValue, ProbeOutcome, RawMetrics};
use crate::target::{Target, TargetKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const TEMPERATURE_C: &str = "temperature_c";
pub const HUMIDITY: &str = "humidity";

/// Reason reported when every sensor attempt failed
pub const SENSOR_UNREADABLE: &str = "sensor unreadable";

/// Failure of a metric fetch against a live host
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed response: {0}")]
    Malformed(#[from] crate::snmp::ber::SnmpCodecError),
    #[error("agent rejected request: {status} at index {index}")]
    Rejected { status: String, index: i64 },
}

/// Sensor read failure
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// Worth retrying (checksum/timing glitch on the one-wire bus)
    #[error("transient read failure: {0}")]
    Transient(String),
    /// Device missing or not accessible, retrying will not help
    #[error("sensor unavailable: {0}")]
    Unavailable(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub temperature_c: f64,
    pub humidity: f64,
}

impl SensorSample {
    pub fn into_metrics(self) -> RawMetrics {
        RawMetrics::from([
            (TEMPERATURE_C.to_string(), MetricValue::Float(self.temperature_c)),
            (HUMIDITY.to_string(), MetricValue::Float(self.humidity)),
        ])
    }
}

/// Reachability and metric retrieval for remote hosts
#[async_trait]
pub trait HostTransport: Send + Sync {
    /// Round-trip time when the host answered within `timeout`
    async fn probe_alive(&self, address: &str, timeout: Duration) -> Option<Duration>;

    /// One request for all `ids`; identifiers the agent does not know are
    /// simply absent from the result
    async fn fetch_metrics(&self, address: &str, ids: &[&str]) -> Result<RawMetrics, FetchError>;
}

/// Synchronous sensor device; called from the blocking pool
pub trait SensorDevice: Send + Sync + 'static {
    fn read(&self, address: &str) -> Result<SensorSample, SensorError>;
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub liveness_timeout: Duration,
    pub sensor_attempts: u32,
    pub sensor_retry_delay: Duration,
    pub metric_ids: Vec<&'static str>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            liveness_timeout: Duration::from_secs(1),
            sensor_attempts: 5,
            sensor_retry_delay: Duration::from_secs(2),
            metric_ids: crate::metrics::HostMetric::request_ids(),
        }
    }
}

#[derive(Clone)]
pub struct MetricSource {
    transport: Arc<dyn HostTransport>,
    sensor: Arc<dyn SensorDevice>,
    settings: SourceSettings,
}

impl MetricSource {
    pub fn new(
        transport: Arc<dyn HostTransport>,
        sensor: Arc<dyn SensorDevice>,
        settings: SourceSettings,
    ) -> Self {
        Self {
            transport,
            sensor,
            settings,
        }
    }

    pub async fn probe(&self, target: &Target) -> ProbeOutcome {
        match target.kind {
            TargetKind::LocalSensor => self.read_sensor(target).await,
            TargetKind::RemoteHost => self.probe_host(target).await,
        }
    }

    async fn probe_host(&self, target: &Target) -> ProbeOutcome {
        let Some(latency) = self
            .transport
            .probe_alive(&target.address, self.settings.liveness_timeout)
            .await
        else {
            info!(target_id = %target.target_id, address = %target.address, "host is offline");
            return ProbeOutcome::Offline;
        };

        match self
            .transport
            .fetch_metrics(&target.address, &self.settings.metric_ids)
            .await
        {
            Ok(metrics) => {
                debug!(
                    target_id = %target.target_id,
                    values = metrics.len(),
                    latency_ms = latency.as_secs_f64() * 1000.0,
                    "metrics fetched"
                );
                ProbeOutcome::Online {
                    metrics,
                    latency: Some(latency),
                }
            }
            Err(e) => {
                warn!(target_id = %target.target_id, error = %e, "metric fetch failed");
                ProbeOutcome::Error(e.to_string())
            }
        }
    }

    async fn read_sensor(&self, target: &Target) -> ProbeOutcome {
        let attempts = self.settings.sensor_attempts.max(1);

        for attempt in 1..=attempts {
            let device = Arc::clone(&self.sensor);
            let address = target.address.clone();
            let result = tokio::task::spawn_blocking(move || device.read(&address)).await;

            match result {
                Ok(Ok(sample)) => {
                    return ProbeOutcome::Online {
                        metrics: sample.into_metrics(),
                        latency: None,
                    };
                }
                Ok(Err(SensorError::Unavailable(e))) => {
                    warn!(target_id = %target.target_id, error = %e, "sensor unavailable");
                    return ProbeOutcome::Error(format!("sensor unavailable: {e}"));
                }
                Ok(Err(e)) => {
                    warn!(target_id = %target.target_id, attempt, max = attempts, error = %e, "sensor read failed");
                }
                Err(e) => {
                    warn!(target_id = %target.target_id, attempt, max = attempts, error = %e, "sensor read task failed");
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.settings.sensor_retry_delay).await;
            }
        }

        ProbeOutcome::Error(SENSOR_UNREADABLE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    struct FixedTransport {
        alive: bool,
        fetch_calls: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl HostTransport for FixedTransport {
        async fn probe_alive(&self, _address: &str, _timeout: Duration) -> Option<Duration> {
            self.alive.then(|| Duration::from_millis(2))
        }

        async fn fetch_metrics(&self, _address: &str, ids: &[&str]) -> Result<RawMetrics, FetchError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(FetchError::Rejected {
                    status: "genErr".into(),
                    index: 1,
                });
            }
            Ok(ids
                .iter()
                .map(|id| (id.to_string(), MetricValue::Integer(1)))
                .collect())
        }
    }

    struct FlakySensor {
        failures: u32,
        calls: AtomicU32,
    }

    impl SensorDevice for FlakySensor {
        fn read(&self, _address: &str) -> Result<SensorSample, SensorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(SensorError::Transient("checksum mismatch".into()));
            }
            Ok(SensorSample {
                temperature_c: 21.5,
                humidity: 48.0,
            })
        }
    }

    struct MissingSensor;

    impl SensorDevice for MissingSensor {
        fn read(&self, _address: &str) -> Result<SensorSample, SensorError> {
            Err(SensorError::Unavailable(std::io::Error::from(
                std::io::ErrorKind::NotFound,
            )))
        }
    }

    fn fast_settings() -> SourceSettings {
        SourceSettings {
            sensor_retry_delay: Duration::from_millis(1),
            ..SourceSettings::default()
        }
    }

    fn source(transport: Arc<FixedTransport>, sensor: Arc<dyn SensorDevice>) -> MetricSource {
        MetricSource::new(transport, sensor, fast_settings())
    }

    fn transport(alive: bool, reject: bool) -> Arc<FixedTransport> {
        Arc::new(FixedTransport {
            alive,
            fetch_calls: AtomicUsize::new(0),
            reject,
        })
    }

    #[tokio::test]
    async fn test_offline_host_skips_fetch() {
        let transport = transport(false, false);
        let sensor = Arc::new(FlakySensor { failures: 0, calls: AtomicU32::new(0) });
        let outcome = source(Arc::clone(&transport), sensor)
            .probe(&Target::remote_host("server1", "192.168.0.61"))
            .await;

        assert_eq!(outcome, ProbeOutcome::Offline);
        assert_eq!(transport.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_live_host_fetches_once() {
        let transport = transport(true, false);
        let sensor = Arc::new(FlakySensor { failures: 0, calls: AtomicU32::new(0) });
        let outcome = source(Arc::clone(&transport), sensor)
            .probe(&Target::remote_host("server1", "192.168.0.61"))
            .await;

        match outcome {
            ProbeOutcome::Online { metrics, latency } => {
                assert_eq!(metrics.len(), 16);
                assert_eq!(latency, Some(Duration::from_millis(2)));
            }
            other => panic!("expected online, got {other:?}"),
        }
        assert_eq!(transport.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_protocol_error_reported_as_error() {
        let transport = transport(true, true);
        let sensor = Arc::new(FlakySensor { failures: 0, calls: AtomicU32::new(0) });
        let outcome = source(transport, sensor)
            .probe(&Target::remote_host("server2", "192.168.0.47"))
            .await;

        assert_eq!(
            outcome,
            ProbeOutcome::Error("agent rejected request: genErr at index 1".into())
        );
    }

    #[tokio::test]
    async fn test_sensor_succeeds_on_last_attempt() {
        let sensor = Arc::new(FlakySensor { failures: 4, calls: AtomicU32::new(0) });
        let outcome = source(transport(true, false), sensor.clone())
            .probe(&Target::local_sensor("dht22", "/sys/bus/iio/devices/iio:device0"))
            .await;

        let expected: HashMap<_, _> = [(TEMPERATURE_C, 21.5), (HUMIDITY, 48.0)].into();
        match outcome {
            ProbeOutcome::Online { metrics, latency: None } => {
                for (name, value) in expected {
                    assert_eq!(metrics[name], MetricValue::Float(value));
                }
            }
            other => panic!("expected online, got {other:?}"),
        }
        assert_eq!(sensor.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_sensor_gives_up_after_five_attempts() {
        let sensor = Arc::new(FlakySensor { failures: u32::MAX, calls: AtomicU32::new(0) });
        let outcome = source(transport(true, false), sensor.clone())
            .probe(&Target::local_sensor("dht22", "/sys/bus/iio/devices/iio:device0"))
            .await;

        assert_eq!(outcome, ProbeOutcome::Error(SENSOR_UNREADABLE.into()));
        assert_eq!(sensor.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_missing_sensor_is_not_retried() {
        let outcome = source(transport(true, false), Arc::new(MissingSensor))
            .probe(&Target::local_sensor("dht22", "/nonexistent"))
            .await;

        match outcome {
            ProbeOutcome::Error(reason) => assert!(reason.starts_with("sensor unavailable")),
            other => panic!("expected error, got {other:?}"),
        }
    }
}
