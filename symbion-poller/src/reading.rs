//! Per-cycle probe results
//!
//! `ProbeOutcome` is generic over its metric payload: the source adapter
//! produces raw values keyed by metric identifier, the prober turns them into
//! a typed `Observation`. A `Reading` pairs one outcome with its target and
//! the UTC instant it was taken.

use crate::target::Target;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Raw value returned by a metric source
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    /// Numeric view; text is parsed (UCD load averages arrive as strings)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Integer(v) => Some(*v as f64),
            MetricValue::Unsigned(v) => Some(*v as f64),
            MetricValue::Float(v) => Some(*v),
            MetricValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            MetricValue::Integer(v) => u64::try_from(*v).ok(),
            MetricValue::Unsigned(v) => Some(*v),
            MetricValue::Float(v) if v.is_finite() && *v >= 0.0 => Some(*v as u64),
            MetricValue::Float(_) => None,
            MetricValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Integer(v) => write!(f, "{v}"),
            MetricValue::Unsigned(v) => write!(f, "{v}"),
            MetricValue::Float(v) => write!(f, "{v}"),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

/// Metric identifier -> value, as returned by one fetch
pub type RawMetrics = BTreeMap<String, MetricValue>;

/// Result of probing one target during one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome<M = RawMetrics> {
    Online {
        metrics: M,
        latency: Option<Duration>,
    },
    Offline,
    Error(String),
}

impl<M> ProbeOutcome<M> {
    pub fn map<N>(self, f: impl FnOnce(M) -> N) -> ProbeOutcome<N> {
        match self {
            ProbeOutcome::Online { metrics, latency } => ProbeOutcome::Online {
                metrics: f(metrics),
                latency,
            },
            ProbeOutcome::Offline => ProbeOutcome::Offline,
            ProbeOutcome::Error(reason) => ProbeOutcome::Error(reason),
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, ProbeOutcome::Online { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            ProbeOutcome::Online { .. } => "Online",
            ProbeOutcome::Offline => "Offline",
            ProbeOutcome::Error(_) => "Error",
        }
    }
}

/// Typed host metrics, named the way they are published
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostObservation {
    pub description: Option<String>,
    pub uptime_seconds: f64,
    pub load_1min: f64,
    pub load_5min: f64,
    pub load_15min: f64,
    pub user_percent: u64,
    pub system_percent: u64,
    pub idle_percent: u64,
    pub total_ram_kb: u64,
    pub free_ram_kb: u64,
    pub total_swap_kb: u64,
    pub available_swap_kb: u64,
    pub total_disk_kb: u64,
    pub available_disk_kb: u64,
    pub used_disk_kb: u64,
    pub disk_usage_percent: u64,
}

/// Sensor sample with derived fields
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorObservation {
    pub temperature_c: f64,
    pub temperature_f: f64,
    pub humidity: f64,
    /// Drives the side-channel flag only, never published
    pub hot: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Host(HostObservation),
    Sensor(SensorObservation),
}

/// One cycle's outcome for one target
#[derive(Debug, Clone)]
pub struct Reading {
    pub target: Arc<Target>,
    pub timestamp: DateTime<Utc>,
    pub outcome: ProbeOutcome<Observation>,
}

impl Reading {
    pub fn new(target: Arc<Target>, outcome: ProbeOutcome<Observation>) -> Self {
        Self {
            target,
            timestamp: Utc::now(),
            outcome,
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target.target_id
    }

    /// Threshold flag for the side-channel, present for online sensor readings
    pub fn hot_flag(&self) -> Option<bool> {
        match &self.outcome {
            ProbeOutcome::Online {
                metrics: Observation::Sensor(sample),
                ..
            } => Some(sample.hot),
            _ => None,
        }
    }
}
