//! SNMP metric identifiers polled on every remote host
//!
//! MIB-II system group plus the UCD-SNMP extensions (net-snmp `extend`
//! tables: laTable, systemStats, memory, dskTable).

/// One metric fetched from a remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostMetric {
    Description,
    Uptime,
    Load1,
    Load5,
    Load15,
    CpuUser,
    CpuSystem,
    CpuIdle,
    SwapTotal,
    SwapAvailable,
    RamTotal,
    RamFree,
    DiskTotal,
    DiskAvailable,
    DiskUsed,
    DiskPercent,
}

impl HostMetric {
    pub const ALL: [HostMetric; 16] = [
        HostMetric::Description,
        HostMetric::Uptime,
        HostMetric::Load1,
        HostMetric::Load5,
        HostMetric::Load15,
        HostMetric::CpuSystem,
        HostMetric::CpuIdle,
        HostMetric::CpuUser,
        HostMetric::SwapTotal,
        HostMetric::SwapAvailable,
        HostMetric::RamTotal,
        HostMetric::RamFree,
        HostMetric::DiskTotal,
        HostMetric::DiskAvailable,
        HostMetric::DiskUsed,
        HostMetric::DiskPercent,
    ];

    pub fn oid(self) -> &'static str {
        match self {
            HostMetric::Description => "1.3.6.1.2.1.1.1.0",
            HostMetric::Uptime => "1.3.6.1.2.1.1.3.0",
            HostMetric::Load1 => "1.3.6.1.4.1.2021.10.1.3.1",
            HostMetric::Load5 => "1.3.6.1.4.1.2021.10.1.3.2",
            HostMetric::Load15 => "1.3.6.1.4.1.2021.10.1.3.3",
            HostMetric::CpuUser => "1.3.6.1.4.1.2021.11.9.0",
            HostMetric::CpuSystem => "1.3.6.1.4.1.2021.11.10.0",
            HostMetric::CpuIdle => "1.3.6.1.4.1.2021.11.11.0",
            HostMetric::SwapTotal => "1.3.6.1.4.1.2021.4.3.0",
            HostMetric::SwapAvailable => "1.3.6.1.4.1.2021.4.4.0",
            HostMetric::RamTotal => "1.3.6.1.4.1.2021.4.5.0",
            HostMetric::RamFree => "1.3.6.1.4.1.2021.4.27.0",
            HostMetric::DiskTotal => "1.3.6.1.4.1.2021.9.1.6.1",
            HostMetric::DiskAvailable => "1.3.6.1.4.1.2021.9.1.7.1",
            HostMetric::DiskUsed => "1.3.6.1.4.1.2021.9.1.8.1",
            HostMetric::DiskPercent => "1.3.6.1.4.1.2021.9.1.9.1",
        }
    }

    pub fn from_oid(oid: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|metric| metric.oid() == oid)
    }

    /// Identifiers for one batched request, in request order
    pub fn request_ids() -> Vec<&'static str> {
        Self::ALL.iter().map(|metric| metric.oid()).collect()
    }
}
