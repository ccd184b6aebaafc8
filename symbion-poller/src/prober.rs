//! Per-target prober
//!
//! Runs the source adapter under the target's own timeout and derives the
//! typed observation from raw values.

use crate::metrics::HostMetric;
use crate::reading::{
    HostObservation, MetricValue, Observation, ProbeOutcome, RawMetrics, Reading,
    SensorObservation,
};
use crate::source::{MetricSource, HUMIDITY, TEMPERATURE_C};
use crate::target::{Target, TargetKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Reason reported when a probe exceeds its target's time budget
pub const TIMEOUT_REASON: &str = "timeout";

pub const DEFAULT_HOT_THRESHOLD_C: f64 = 27.0;

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Strictly above the threshold
pub fn is_hot(celsius: f64, threshold_c: f64) -> bool {
    celsius > threshold_c
}

impl HostObservation {
    /// Missing or unparsable identifiers default to zero
    pub fn from_raw(raw: &RawMetrics) -> Self {
        let value = |metric: HostMetric| raw.get(metric.oid());
        let float = |metric| value(metric).and_then(MetricValue::as_f64).unwrap_or(0.0);
        let count = |metric| value(metric).and_then(MetricValue::as_u64).unwrap_or(0);

        Self {
            description: value(HostMetric::Description).map(ToString::to_string),
            // sysUpTime is in hundredths of a second
            uptime_seconds: count(HostMetric::Uptime) as f64 / 100.0,
            load_1min: float(HostMetric::Load1),
            load_5min: float(HostMetric::Load5),
            load_15min: float(HostMetric::Load15),
            user_percent: count(HostMetric::CpuUser),
            system_percent: count(HostMetric::CpuSystem),
            idle_percent: count(HostMetric::CpuIdle),
            total_ram_kb: count(HostMetric::RamTotal),
            free_ram_kb: count(HostMetric::RamFree),
            total_swap_kb: count(HostMetric::SwapTotal),
            available_swap_kb: count(HostMetric::SwapAvailable),
            total_disk_kb: count(HostMetric::DiskTotal),
            available_disk_kb: count(HostMetric::DiskAvailable),
            used_disk_kb: count(HostMetric::DiskUsed),
            disk_usage_percent: count(HostMetric::DiskPercent),
        }
    }
}

impl SensorObservation {
    pub fn from_raw(raw: &RawMetrics, hot_threshold_c: f64) -> Option<Self> {
        let temperature_c = raw.get(TEMPERATURE_C)?.as_f64()?;
        let humidity = raw.get(HUMIDITY)?.as_f64()?;

        Some(Self {
            temperature_c,
            temperature_f: celsius_to_fahrenheit(temperature_c),
            humidity,
            hot: is_hot(temperature_c, hot_threshold_c),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProberSettings {
    pub host_timeout: Duration,
    pub sensor_timeout: Duration,
    pub hot_threshold_c: f64,
}

impl Default for ProberSettings {
    fn default() -> Self {
        Self {
            host_timeout: Duration::from_secs(5),
            // 5 attempts with 2s between them must fit
            sensor_timeout: Duration::from_secs(15),
            hot_threshold_c: DEFAULT_HOT_THRESHOLD_C,
        }
    }
}

#[derive(Clone)]
pub struct Prober {
    source: MetricSource,
    settings: ProberSettings,
}

impl Prober {
    pub fn new(source: MetricSource, settings: ProberSettings) -> Self {
        Self { source, settings }
    }

    fn timeout_for(&self, kind: TargetKind) -> Duration {
        match kind {
            TargetKind::LocalSensor => self.settings.sensor_timeout,
            TargetKind::RemoteHost => self.settings.host_timeout,
        }
    }

    /// Always yields a reading; a probe past its deadline is cancelled and
    /// reported as `Error("timeout")`
    pub async fn probe(&self, target: Arc<Target>) -> Reading {
        let limit = self.timeout_for(target.kind);

        let outcome = match tokio::time::timeout(limit, self.source.probe(&target)).await {
            Ok(raw) => self.derive(&target, raw),
            Err(_) => {
                warn!(
                    target_id = %target.target_id,
                    timeout_ms = limit.as_millis() as u64,
                    "probe timed out"
                );
                ProbeOutcome::Error(TIMEOUT_REASON.to_string())
            }
        };

        Reading::new(target, outcome)
    }

    fn derive(&self, target: &Target, raw: ProbeOutcome) -> ProbeOutcome<Observation> {
        match target.kind {
            TargetKind::RemoteHost => {
                raw.map(|metrics| Observation::Host(HostObservation::from_raw(&metrics)))
            }
            TargetKind::LocalSensor => match raw {
                ProbeOutcome::Online { metrics, latency } => {
                    match SensorObservation::from_raw(&metrics, self.settings.hot_threshold_c) {
                        Some(sample) => ProbeOutcome::Online {
                            metrics: Observation::Sensor(sample),
                            latency,
                        },
                        None => ProbeOutcome::Error("incomplete sensor sample".to_string()),
                    }
                }
                ProbeOutcome::Offline => ProbeOutcome::Offline,
                ProbeOutcome::Error(reason) => ProbeOutcome::Error(reason),
            },
        }
    }
}
