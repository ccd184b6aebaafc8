//! Symbion Poller - concurrent telemetry collection for the Symbion bus
//!
//! Polls a fixed set of targets once per cycle and republishes one normalized
//! record per target to MQTT:
//! - Remote hosts: ICMP liveness check, then a single batched SNMPv2c GET
//! - Local sensor: DHT22 read through the Linux IIO driver, bounded retries
//! - One tokio task per target, joined as a group before the next cycle
//! - A slow or unreachable target never delays the others

pub mod config;
pub mod error;
pub mod liveness;
pub mod metrics;
pub mod mqtt;
pub mod normalize;
pub mod prober;
pub mod reading;
pub mod scheduler;
pub mod sensor;
pub mod signal;
pub mod sink;
pub mod snmp;
pub mod source;
pub mod target;
pub mod transport;

pub use config::{load_config, PollerConfig};
pub use error::EngineError;
pub use normalize::{normalize, Record};
pub use prober::Prober;
pub use reading::{MetricValue, ProbeOutcome, RawMetrics, Reading};
pub use scheduler::{CyclePhase, CycleReport, Scheduler};
pub use sink::{Delivery, PublishSink, SinkError};
pub use source::{HostTransport, MetricSource, SensorDevice};
pub use target::{Target, TargetKind};
