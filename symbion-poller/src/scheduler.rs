//! Fan-out scheduler
//!
//! Each cycle spawns one task per target, every task probes, normalizes and
//! publishes its own reading as soon as it is ready. The cycle ends when all
//! tasks have joined, so a slow target only delays the start of the next
//! cycle, never the other targets of the current one.

use crate::config::PollerConfig;
use crate::error::EngineError;
use crate::normalize::normalize;
use crate::prober::Prober;
use crate::reading::{Observation, ProbeOutcome, Reading};
use crate::signal::FlagSignal;
use crate::sink::{Delivery, PublishSink};
use crate::source::{HostTransport, MetricSource, SensorDevice};
use crate::target::Target;
use futures::future::join_all;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Reason attached to a target whose probe task panicked
pub const PROBE_ABORTED: &str = "probe task aborted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Dispatching,
    Probing,
    CycleComplete,
}

#[derive(Debug)]
pub struct CycleReport {
    pub number: u64,
    /// One per configured target, in configuration order
    pub readings: Vec<Reading>,
    pub elapsed: Duration,
}

impl CycleReport {
    fn count(&self, status: &str) -> usize {
        self.readings
            .iter()
            .filter(|r| r.outcome.status() == status)
            .count()
    }

    pub fn online(&self) -> usize {
        self.readings.iter().filter(|r| r.outcome.is_online()).count()
    }

    pub fn offline(&self) -> usize {
        self.count("Offline")
    }

    pub fn errors(&self) -> usize {
        self.count("Error")
    }
}

pub struct Scheduler {
    targets: Vec<Arc<Target>>,
    prober: Prober,
    delivery: Arc<Delivery>,
    signal: Arc<dyn FlagSignal>,
    interval: Duration,
    phase: Mutex<CyclePhase>,
    cycles: AtomicU64,
}

impl Scheduler {
    pub fn new(
        targets: Vec<Target>,
        prober: Prober,
        sink: Arc<dyn PublishSink>,
        signal: Arc<dyn FlagSignal>,
        interval: Duration,
    ) -> Self {
        Self {
            targets: targets.into_iter().map(Arc::new).collect(),
            prober,
            delivery: Arc::new(Delivery::new(sink)),
            signal,
            interval,
            phase: Mutex::new(CyclePhase::Idle),
            cycles: AtomicU64::new(0),
        }
    }

    /// Wires the sources and timeouts of `config` around the given collaborators
    pub fn from_config(
        config: &PollerConfig,
        transport: Arc<dyn HostTransport>,
        sensor: Arc<dyn SensorDevice>,
        sink: Arc<dyn PublishSink>,
        signal: Arc<dyn FlagSignal>,
    ) -> Self {
        let source = MetricSource::new(transport, sensor, config.source_settings());
        let prober = Prober::new(source, config.prober_settings());
        Self::new(
            config.targets.clone(),
            prober,
            sink,
            signal,
            config.polling.interval(),
        )
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: CyclePhase) {
        *self.phase.lock() = phase;
    }

    pub fn targets(&self) -> &[Arc<Target>] {
        &self.targets
    }

    /// Probe every target once; fails only when the publish sink is lost
    pub async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
        let number = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let started = Instant::now();

        self.set_phase(CyclePhase::Dispatching);
        debug!(cycle = number, targets = self.targets.len(), "dispatching probes");
        let handles: Vec<_> = self
            .targets
            .iter()
            .map(|target| {
                tokio::spawn(probe_and_publish(
                    self.prober.clone(),
                    Arc::clone(&self.delivery),
                    Arc::clone(&self.signal),
                    Arc::clone(target),
                ))
            })
            .collect();

        self.set_phase(CyclePhase::Probing);
        let joined = join_all(handles).await;

        let mut readings = Vec::with_capacity(self.targets.len());
        let mut fatal = None;
        for (target, result) in self.targets.iter().zip(joined) {
            let (reading, delivered) = match result {
                Ok(done) => done,
                Err(e) => {
                    error!(target_id = %target.target_id, error = %e, "probe task aborted");
                    let reading = Reading::new(
                        Arc::clone(target),
                        ProbeOutcome::Error(PROBE_ABORTED.to_string()),
                    );
                    let delivered = self
                        .delivery
                        .deliver(&target.target_id, &normalize(&reading))
                        .await;
                    (reading, delivered)
                }
            };
            if let Err(e) = delivered {
                if fatal.is_none() {
                    fatal = Some(e);
                }
            }
            readings.push(reading);
        }

        self.set_phase(CyclePhase::CycleComplete);
        if let Some(e) = fatal {
            return Err(e);
        }

        let report = CycleReport {
            number,
            readings,
            elapsed: started.elapsed(),
        };
        info!(
            cycle = number,
            online = report.online(),
            offline = report.offline(),
            errors = report.errors(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "polling cycle complete"
        );
        Ok(report)
    }

    /// Sleeps the full `interval` after each cycle completes, until `shutdown`
    /// resolves or the sink is lost
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<(), EngineError> {
        tokio::pin!(shutdown);
        info!(
            targets = self.targets.len(),
            interval_secs = self.interval.as_secs(),
            "poller started"
        );

        loop {
            tokio::select! {
                result = self.run_cycle() => { result?; }
                _ = &mut shutdown => break,
            }

            self.set_phase(CyclePhase::Idle);
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => break,
            }
        }

        info!("shutdown requested, poller stopped");
        self.set_phase(CyclePhase::Idle);
        Ok(())
    }
}

async fn probe_and_publish(
    prober: Prober,
    delivery: Arc<Delivery>,
    signal: Arc<dyn FlagSignal>,
    target: Arc<Target>,
) -> (Reading, Result<(), EngineError>) {
    let reading = prober.probe(target).await;

    if let Some(hot) = reading.hot_flag() {
        signal.signal(hot);
    }
    log_reading(&reading);

    let record = normalize(&reading);
    debug!(target_id = %reading.target_id(), payload = ?record.payload, "record ready");
    let delivered = delivery.deliver(reading.target_id(), &record).await;
    (reading, delivered)
}

fn log_reading(reading: &Reading) {
    let target_id = reading.target_id();
    match &reading.outcome {
        ProbeOutcome::Online {
            metrics: Observation::Sensor(sample),
            ..
        } => info!(
            %target_id,
            temperature_c = sample.temperature_c,
            humidity = sample.humidity,
            hot = sample.hot,
            "sensor reading"
        ),
        ProbeOutcome::Online {
            metrics: Observation::Host(_),
            latency,
        } => debug!(
            %target_id,
            latency_ms = latency.map(|rtt| rtt.as_secs_f64() * 1000.0),
            "host online"
        ),
        ProbeOutcome::Offline => debug!(%target_id, "host offline"),
        ProbeOutcome::Error(reason) => warn!(%target_id, %reason, "probe failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Record;
    use crate::prober::ProberSettings;
    use crate::reading::RawMetrics;
    use crate::signal::NoSignal;
    use crate::sink::SinkError;
    use crate::source::{FetchError, SensorError, SensorSample, SourceSettings};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Hosts whose address starts with "10." are down
    struct SubnetTransport;

    #[async_trait]
    impl HostTransport for SubnetTransport {
        async fn probe_alive(&self, address: &str, _timeout: Duration) -> Option<Duration> {
            (!address.starts_with("10.")).then(|| Duration::from_millis(1))
        }

        async fn fetch_metrics(&self, _address: &str, _ids: &[&str]) -> Result<RawMetrics, FetchError> {
            Ok(RawMetrics::new())
        }
    }

    struct NoSensor;

    impl SensorDevice for NoSensor {
        fn read(&self, _address: &str) -> Result<SensorSample, SensorError> {
            Err(SensorError::Transient("no device".into()))
        }
    }

    /// Up like `SubnetTransport`, but panics on "panic" and records call times
    #[derive(Default)]
    struct TimedTransport {
        fetch_delay: Duration,
        alive_at: StdMutex<Vec<Instant>>,
        fetched_at: StdMutex<Vec<Instant>>,
    }

    #[async_trait]
    impl HostTransport for TimedTransport {
        async fn probe_alive(&self, address: &str, _timeout: Duration) -> Option<Duration> {
            if address == "panic" {
                panic!("transport failure for {address}");
            }
            self.alive_at.lock().unwrap().push(Instant::now());
            Some(Duration::from_millis(1))
        }

        async fn fetch_metrics(&self, _address: &str, _ids: &[&str]) -> Result<RawMetrics, FetchError> {
            tokio::time::sleep(self.fetch_delay).await;
            self.fetched_at.lock().unwrap().push(Instant::now());
            Ok(RawMetrics::new())
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        ids: StdMutex<Vec<String>>,
        records: StdMutex<Vec<Record>>,
    }

    #[async_trait]
    impl PublishSink for CollectingSink {
        async fn publish(&self, target_id: &str, record: &Record) -> Result<(), SinkError> {
            self.ids.lock().unwrap().push(target_id.to_string());
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn reconnect(&self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn scheduler(targets: Vec<Target>, sink: Arc<CollectingSink>) -> Scheduler {
        scheduler_with(targets, sink, Arc::new(SubnetTransport), Duration::from_secs(60))
    }

    fn scheduler_with(
        targets: Vec<Target>,
        sink: Arc<CollectingSink>,
        transport: Arc<dyn HostTransport>,
        interval: Duration,
    ) -> Scheduler {
        let source = MetricSource::new(
            transport,
            Arc::new(NoSensor),
            SourceSettings {
                sensor_attempts: 2,
                sensor_retry_delay: Duration::from_millis(1),
                ..SourceSettings::default()
            },
        );
        let prober = Prober::new(source, ProberSettings::default());
        Scheduler::new(targets, prober, sink, Arc::new(NoSignal), interval)
    }

    #[tokio::test]
    async fn test_cycle_reports_one_reading_per_target() {
        let sink = Arc::new(CollectingSink::default());
        let scheduler = scheduler(
            vec![
                Target::remote_host("server1", "192.168.0.61"),
                Target::remote_host("server2", "10.0.0.2"),
                Target::local_sensor("dht22", "/nonexistent"),
            ],
            Arc::clone(&sink),
        );
        assert_eq!(scheduler.phase(), CyclePhase::Idle);

        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(report.number, 1);
        let ids: Vec<_> = report.readings.iter().map(|r| r.target_id()).collect();
        assert_eq!(ids, ["server1", "server2", "dht22"]);
        assert_eq!((report.online(), report.offline(), report.errors()), (1, 1, 1));
        assert_eq!(scheduler.phase(), CyclePhase::CycleComplete);

        let mut published = sink.ids.lock().unwrap().clone();
        published.sort();
        assert_eq!(published, ["dht22", "server1", "server2"]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let sink = Arc::new(CollectingSink::default());
        let scheduler = scheduler(vec![Target::remote_host("server1", "192.168.0.61")], sink.clone());

        scheduler
            .run(tokio::time::sleep(Duration::from_millis(200)))
            .await
            .unwrap();

        assert_eq!(sink.ids.lock().unwrap().len(), 1);
        assert_eq!(scheduler.phase(), CyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_panicked_probe_still_yields_error_reading() {
        let sink = Arc::new(CollectingSink::default());
        let scheduler = scheduler_with(
            vec![
                Target::remote_host("server1", "192.168.0.61"),
                Target::remote_host("server2", "panic"),
                Target::remote_host("server3", "192.168.0.18"),
            ],
            Arc::clone(&sink),
            Arc::new(TimedTransport::default()),
            Duration::from_secs(60),
        );

        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(report.readings.len(), 3);
        assert_eq!(report.readings[1].target_id(), "server2");
        assert_eq!(report.readings[1].outcome, ProbeOutcome::Error(PROBE_ABORTED.into()));
        assert_eq!((report.online(), report.errors()), (2, 1));

        assert_eq!(sink.ids.lock().unwrap().len(), 3);
        let records = sink.records.lock().unwrap().clone();
        let unreachable: Vec<_> = records.iter().filter(|r| r.is_unreachable()).collect();
        assert_eq!(unreachable.len(), 1);
        let payload: serde_json::Value = serde_json::from_slice(&unreachable[0].to_json().unwrap()).unwrap();
        assert_eq!(payload["target_id"], "server2");
        assert_eq!(payload["address"], "panic");
        assert_eq!(payload.as_object().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_full_interval_between_cycles() {
        let interval = Duration::from_millis(300);
        let transport = Arc::new(TimedTransport {
            fetch_delay: Duration::from_millis(200),
            ..TimedTransport::default()
        });
        let scheduler = scheduler_with(
            vec![Target::remote_host("server1", "192.168.0.61")],
            Arc::new(CollectingSink::default()),
            transport.clone(),
            interval,
        );

        // first cycle ends near 200ms, the second may only start near 500ms
        scheduler
            .run(tokio::time::sleep(Duration::from_millis(450)))
            .await
            .unwrap();
        assert_eq!(transport.alive_at.lock().unwrap().len(), 1);

        scheduler
            .run(tokio::time::sleep(Duration::from_millis(650)))
            .await
            .unwrap();
        let started = transport.alive_at.lock().unwrap().clone();
        let finished = transport.fetched_at.lock().unwrap().clone();
        assert_eq!(started.len(), 3);
        assert!(started[2].duration_since(finished[1]) >= interval);
    }
}
