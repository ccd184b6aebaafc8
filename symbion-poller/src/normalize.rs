//! Payload normalizer
//!
//! Turns a `Reading` into the JSON record published on the bus. Unreachable
//! and failed targets publish identity only (no zero-filled metrics) so
//! consumers can tell "down" from "idle".

use crate::reading::{HostObservation, Observation, ProbeOutcome, Reading, SensorObservation};
use crate::target::TargetKind;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::time::Duration;

/// Publish-ready record plus the routing information the sink needs
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: TargetKind,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Host(Box<HostRecord>),
    Sensor(SensorRecord),
    Unreachable(UnreachableRecord),
}

/// Offline and error readings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnreachableRecord {
    pub target_id: String,
    pub address: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostRecord {
    pub target_id: String,
    pub address: String,
    pub timestamp: String,
    pub status: &'static str,
    pub system: SystemSection,
    pub cpu: CpuSection,
    pub memory: MemorySection,
    pub storage: StorageSection,
    pub network: NetworkSection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSection {
    pub description: Option<String>,
    pub uptime_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuSection {
    pub load_1min: f64,
    pub load_5min: f64,
    pub load_15min: f64,
    pub user_percent: u64,
    pub system_percent: u64,
    pub idle_percent: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySection {
    pub total_ram_kb: u64,
    pub free_ram_kb: u64,
    pub total_swap_kb: u64,
    pub available_swap_kb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageSection {
    pub total_disk_kb: u64,
    pub available_disk_kb: u64,
    pub used_disk_kb: u64,
    pub disk_usage_percent: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSection {
    pub latency_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRecord {
    pub temperature_c: f64,
    pub temperature_f: f64,
    pub humidity: f64,
}

impl Record {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.payload)
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self.payload, Payload::Unreachable(_))
    }
}

/// ISO-8601 UTC with microseconds and a `Z` suffix
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn normalize(reading: &Reading) -> Record {
    let target = &reading.target;
    let timestamp = format_timestamp(&reading.timestamp);

    let payload = match &reading.outcome {
        ProbeOutcome::Online {
            metrics: Observation::Host(host),
            latency,
        } => Payload::Host(Box::new(host_record(
            &target.target_id,
            &target.address,
            timestamp,
            host,
            *latency,
        ))),
        ProbeOutcome::Online {
            metrics: Observation::Sensor(sample),
            ..
        } => Payload::Sensor(sensor_record(sample)),
        ProbeOutcome::Offline | ProbeOutcome::Error(_) => Payload::Unreachable(UnreachableRecord {
            target_id: target.target_id.clone(),
            address: target.address.clone(),
            timestamp,
        }),
    };

    Record {
        kind: target.kind,
        payload,
    }
}

fn host_record(
    target_id: &str,
    address: &str,
    timestamp: String,
    host: &HostObservation,
    latency: Option<Duration>,
) -> HostRecord {
    HostRecord {
        target_id: target_id.to_string(),
        address: address.to_string(),
        timestamp,
        status: "Online",
        system: SystemSection {
            description: host.description.clone(),
            uptime_seconds: host.uptime_seconds,
        },
        cpu: CpuSection {
            load_1min: host.load_1min,
            load_5min: host.load_5min,
            load_15min: host.load_15min,
            user_percent: host.user_percent,
            system_percent: host.system_percent,
            idle_percent: host.idle_percent,
        },
        memory: MemorySection {
            total_ram_kb: host.total_ram_kb,
            free_ram_kb: host.free_ram_kb,
            total_swap_kb: host.total_swap_kb,
            available_swap_kb: host.available_swap_kb,
        },
        storage: StorageSection {
            total_disk_kb: host.total_disk_kb,
            available_disk_kb: host.available_disk_kb,
            used_disk_kb: host.used_disk_kb,
            disk_usage_percent: host.disk_usage_percent,
        },
        network: NetworkSection {
            latency_ms: latency.map(|rtt| round_to(rtt.as_secs_f64() * 1000.0, 2)),
        },
    }
}

fn sensor_record(sample: &SensorObservation) -> SensorRecord {
    SensorRecord {
        temperature_c: round_to(sample.temperature_c, 1),
        temperature_f: round_to(sample.temperature_f, 1),
        humidity: round_to(sample.humidity, 1),
    }
}
