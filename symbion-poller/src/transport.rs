//! Network transport for remote hosts

use crate::liveness;
use crate::reading::RawMetrics;
use crate::snmp::SnmpClient;
use crate::source::{FetchError, HostTransport};
use async_trait::async_trait;
use std::time::Duration;

/// Production transport: `ping` for liveness, SNMPv2c for metrics
pub struct NetTransport {
    snmp: SnmpClient,
}

impl NetTransport {
    pub fn new(snmp: SnmpClient) -> Self {
        Self { snmp }
    }
}

#[async_trait]
impl HostTransport for NetTransport {
    async fn probe_alive(&self, address: &str, timeout: Duration) -> Option<Duration> {
        liveness::ping(address, timeout).await
    }

    async fn fetch_metrics(&self, address: &str, ids: &[&str]) -> Result<RawMetrics, FetchError> {
        self.snmp.get(address, ids).await
    }
}
