/**
 * SYMBION POLLER - Point d'entrée du collecteur de télémétrie
 *
 * RÔLE : Charge la config, connecte le sink MQTT, prépare le FIFO du flag
 * température puis lance les cycles de polling (hôtes SNMP + capteur DHT22).
 *
 * SORTIE : code 0 sur Ctrl-C (ou après un cycle avec --once), code 1 si le
 * broker est perdu (2 reconnexions consécutives échouées) ou au démarrage.
 */

use anyhow::{Context, Result};
use std::sync::Arc;
use symbion_poller::mqtt::MqttSink;
use symbion_poller::sensor::IioSensor;
use symbion_poller::signal::{FifoFlag, FlagSignal, NoSignal};
use symbion_poller::snmp::SnmpClient;
use symbion_poller::transport::NetTransport;
use symbion_poller::{load_config, Scheduler};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("symbion_poller=info")),
        )
        .init();

    let once = std::env::args().skip(1).any(|arg| arg == "--once");

    let config = load_config().await.context("failed to load poller configuration")?;
    info!(targets = config.targets.len(), "configuration loaded");

    let sink = Arc::new(
        MqttSink::connect(&config.mqtt)
            .await
            .with_context(|| format!("cannot reach MQTT broker {}:{}", config.mqtt.host, config.mqtt.port))?,
    );

    // flag FIFO uniquement si un capteur est configuré
    let signal: Arc<dyn FlagSignal> = if config.has_sensor() {
        let flag = FifoFlag::create(&config.sensor.flag_path)
            .with_context(|| format!("cannot create flag FIFO {}", config.sensor.flag_path.display()))?;
        Arc::new(flag)
    } else {
        Arc::new(NoSignal)
    };

    let snmp = SnmpClient::new(config.snmp.community.clone(), config.snmp.port, config.snmp.timeout());
    let scheduler = Scheduler::from_config(
        &config,
        Arc::new(NetTransport::new(snmp)),
        Arc::new(IioSensor),
        sink.clone(),
        signal,
    );

    let outcome = if once {
        scheduler.run_cycle().await.map(|_| ())
    } else {
        scheduler
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "cannot listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            })
            .await
    };

    match outcome {
        Ok(()) => {
            sink.close().await;
            info!("poller stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "fatal error, stopping poller");
            Err(e.into())
        }
    }
}
