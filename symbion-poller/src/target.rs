use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of polled entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// DHT22 attached to this machine; `address` is the IIO device directory
    LocalSensor,
    /// Network host answering ping and SNMP; `address` is an IP or hostname
    RemoteHost,
}

impl Default for TargetKind {
    fn default() -> Self {
        TargetKind::RemoteHost
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::LocalSensor => f.write_str("local_sensor"),
            TargetKind::RemoteHost => f.write_str("remote_host"),
        }
    }
}

/// A configured target. Defined once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub target_id: String,
    pub address: String,
    #[serde(default)]
    pub kind: TargetKind,
}

impl Target {
    pub fn remote_host(target_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            address: address.into(),
            kind: TargetKind::RemoteHost,
        }
    }

    pub fn local_sensor(target_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            address: address.into(),
            kind: TargetKind::LocalSensor,
        }
    }
}
