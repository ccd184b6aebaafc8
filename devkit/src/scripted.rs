/*!
Transport, capteur et flag scriptés

Remplacent ping/SNMP, le driver IIO et le FIFO pour piloter chaque cible
d'un cycle: hôte hors ligne, fetch lent, agent qui rejette la requête,
capteur qui échoue N fois avant de répondre.
*/

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use symbion_poller::metrics::HostMetric;
use symbion_poller::signal::FlagSignal;
use symbion_poller::source::{FetchError, HostTransport, SensorDevice, SensorError, SensorSample};
use symbion_poller::{MetricValue, RawMetrics};

/// Behaviour of one scripted host
#[derive(Debug, Clone)]
pub struct HostScript {
    pub alive: bool,
    pub latency: Duration,
    pub fetch_delay: Duration,
    pub metrics: RawMetrics,
    /// Error-status name returned instead of metrics
    pub reject: Option<String>,
}

impl HostScript {
    pub fn online(metrics: RawMetrics) -> Self {
        Self {
            alive: true,
            latency: Duration::from_millis(2),
            fetch_delay: Duration::ZERO,
            metrics,
            reject: None,
        }
    }

    pub fn offline() -> Self {
        Self {
            alive: false,
            ..Self::online(RawMetrics::new())
        }
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn rejecting(mut self, status: &str) -> Self {
        self.reject = Some(status.to_string());
        self
    }
}

/// Valeurs plausibles pour les 16 métriques d'un hôte net-snmp
pub fn full_host_metrics() -> RawMetrics {
    HostMetric::ALL
        .into_iter()
        .map(|metric| {
            let value = match metric {
                HostMetric::Description => MetricValue::Text("Linux server 6.1.0-18-amd64".into()),
                HostMetric::Uptime => MetricValue::Unsigned(123_456),
                HostMetric::Load1 => MetricValue::Text("0.25".into()),
                HostMetric::Load5 => MetricValue::Text("0.20".into()),
                HostMetric::Load15 => MetricValue::Text("0.10".into()),
                HostMetric::CpuUser => MetricValue::Integer(2),
                HostMetric::CpuSystem => MetricValue::Integer(1),
                HostMetric::CpuIdle => MetricValue::Integer(97),
                HostMetric::SwapTotal => MetricValue::Integer(2_097_148),
                HostMetric::SwapAvailable => MetricValue::Integer(2_000_000),
                HostMetric::RamTotal => MetricValue::Integer(8_000_000),
                HostMetric::RamFree => MetricValue::Integer(6_000_000),
                HostMetric::DiskTotal => MetricValue::Integer(100_000),
                HostMetric::DiskAvailable => MetricValue::Integer(60_000),
                HostMetric::DiskUsed => MetricValue::Integer(40_000),
                HostMetric::DiskPercent => MetricValue::Integer(40),
            };
            (metric.oid().to_string(), value)
        })
        .collect()
}

/// Host transport keyed by address; unknown addresses are offline
#[derive(Default)]
pub struct ScriptedTransport {
    hosts: Mutex<HashMap<String, HostScript>>,
    alive_calls: Mutex<HashMap<String, usize>>,
    fetch_calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_host(&self, address: &str, script: HostScript) {
        self.hosts.lock().unwrap().insert(address.to_string(), script);
    }

    pub fn alive_calls(&self, address: &str) -> usize {
        self.alive_calls.lock().unwrap().get(address).copied().unwrap_or(0)
    }

    pub fn fetch_calls(&self, address: &str) -> usize {
        self.fetch_calls.lock().unwrap().get(address).copied().unwrap_or(0)
    }

    fn script(&self, address: &str) -> Option<HostScript> {
        self.hosts.lock().unwrap().get(address).cloned()
    }
}

#[async_trait]
impl HostTransport for ScriptedTransport {
    async fn probe_alive(&self, address: &str, _timeout: Duration) -> Option<Duration> {
        *self.alive_calls.lock().unwrap().entry(address.to_string()).or_default() += 1;
        self.script(address)
            .filter(|script| script.alive)
            .map(|script| script.latency)
    }

    async fn fetch_metrics(&self, address: &str, ids: &[&str]) -> Result<RawMetrics, FetchError> {
        *self.fetch_calls.lock().unwrap().entry(address.to_string()).or_default() += 1;
        let Some(script) = self.script(address) else {
            return Err(FetchError::Timeout);
        };

        if !script.fetch_delay.is_zero() {
            tokio::time::sleep(script.fetch_delay).await;
        }
        if let Some(status) = script.reject {
            return Err(FetchError::Rejected { status, index: 0 });
        }

        Ok(script
            .metrics
            .into_iter()
            .filter(|(id, _)| ids.contains(&id.as_str()))
            .collect())
    }
}

/// Capteur rejouant une suite de résultats, puis toujours le dernier échantillon
pub struct ScriptedSensor {
    script: Mutex<VecDeque<Option<SensorSample>>>,
    fallback: Option<SensorSample>,
    calls: Mutex<usize>,
}

impl ScriptedSensor {
    pub fn reading(temperature_c: f64, humidity: f64) -> Self {
        Self::failing_then(0, temperature_c, humidity)
    }

    /// `failures` lectures transitoires en échec avant de répondre
    pub fn failing_then(failures: usize, temperature_c: f64, humidity: f64) -> Self {
        Self {
            script: Mutex::new(std::iter::repeat(None).take(failures).collect()),
            fallback: Some(SensorSample {
                temperature_c,
                humidity,
            }),
            calls: Mutex::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl SensorDevice for ScriptedSensor {
    fn read(&self, _address: &str) -> Result<SensorSample, SensorError> {
        *self.calls.lock().unwrap() += 1;
        let next = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
        next.ok_or_else(|| SensorError::Transient("scripted checksum mismatch".into()))
    }
}

/// Enregistre chaque valeur du flag température
#[derive(Default)]
pub struct RecordingSignal {
    values: Mutex<Vec<bool>>,
}

impl RecordingSignal {
    pub fn values(&self) -> Vec<bool> {
        self.values.lock().unwrap().clone()
    }
}

impl FlagSignal for RecordingSignal {
    fn signal(&self, hot: bool) {
        self.values.lock().unwrap().push(hot);
    }
}
