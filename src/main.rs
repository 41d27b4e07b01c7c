mod config;
mod models;
mod mqtt_session;
mod network_link;
mod service_utils;
mod supervisor;
mod telemetry;

use crate::config::Config;
use crate::mqtt_session::MqttSession;
use crate::network_link::ProbeLink;
use crate::service_utils::{handle_shutdown, init_logging};
use crate::supervisor::{ConnectivitySupervisor, SupervisorSettings};
use crate::telemetry::FakeTemperatureSensor;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize logging
    init_logging();

    info!("Booting...");

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Error loading configuration: {:?}", e);
            return;
        }
    };

    let link = ProbeLink::new(
        config.credentials(),
        config.wifi_probe_addr.clone(),
        Duration::from_millis(config.wifi_poll_interval_ms),
    );
    let session = MqttSession::new(config.broker_endpoint(), config.mqtt_client_id.clone());
    let sensor = FakeTemperatureSensor::new();

    let settings = SupervisorSettings {
        topic: config.telemetry_topic.clone(),
        publish_interval: Duration::from_millis(config.publish_interval_ms),
        link_retry: config.wifi_retry(),
        session_retry: config.mqtt_retry(),
    };

    let mut supervisor = ConnectivitySupervisor::new(link, session, sensor, settings);

    tokio::select! {
        _ = supervisor.run() => {}
        _ = handle_shutdown() => {}
    }

    info!("Telemetry service shut down.");
}
