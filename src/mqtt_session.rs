use async_trait::async_trait;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::models::BrokerEndpoint;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// How long one `service_events` pass waits for a further pending event
/// before handing control back to the cycle.
const EVENT_POLL_GRACE: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no session established with the broker")]
    NotConnected,
    #[error("broker handshake failed: {0}")]
    Handshake(String),
    #[error("transport rejected the publish: {0}")]
    Publish(#[from] rumqttc::ClientError),
}

/// Capability seam over the MQTT client.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Attempt the session handshake. Requires the network link to be up;
    /// against a dead link the transport simply fails.
    async fn connect(&self) -> Result<(), SessionError>;

    async fn is_connected(&self) -> bool;

    /// Best-effort, at-most-once. Success means the transport accepted the
    /// message, not that anyone received it.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), SessionError>;

    /// Drain pending client events (keep-alives, inbound frames). Must run
    /// every cycle while connected or the peer drops the session.
    async fn service_events(&self);
}

#[derive(Debug)]
enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

/// Broker session over rumqttc. The event loop is polled from `connect` and
/// `service_events` only, so session state stays on the supervisor's call
/// path and needs no free-running task.
pub struct MqttSession {
    endpoint: BrokerEndpoint,
    client_id: String,
    client_state: Mutex<ClientState>,
    client: Mutex<Option<AsyncClient>>,
    eventloop: Mutex<Option<EventLoop>>,
}

impl MqttSession {
    pub fn new(endpoint: BrokerEndpoint, client_id: String) -> Self {
        info!("Setting MQTT server to {}", endpoint);
        Self {
            endpoint,
            client_id,
            client_state: Mutex::new(ClientState::Disconnected),
            client: Mutex::new(None),
            eventloop: Mutex::new(None),
        }
    }

    fn handle_event(&self, event: &Event) {
        match event {
            Event::Incoming(Packet::Publish(publish)) => {
                let payload =
                    String::from_utf8(publish.payload.to_vec()).unwrap_or_else(|_| "".to_string());
                match serde_json::from_str::<serde_json::Value>(&payload) {
                    Ok(value) => debug!("Inbound message on '{}': {}", publish.topic, value),
                    Err(_) => warn!(
                        "Non-JSON message on '{}' ({} bytes).",
                        publish.topic,
                        publish.payload.len()
                    ),
                }
            }
            Event::Incoming(Packet::ConnAck(_)) => {
                info!("Connected to MQTT broker.");
            }
            Event::Incoming(Packet::PingResp) => {
                debug!("Keep-alive acknowledged.");
            }
            Event::Outgoing(_) => {
                debug!("Outgoing event.");
            }
            _ => {
                debug!("Unhandled event: {:?}", event);
            }
        }
    }
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn connect(&self) -> Result<(), SessionError> {
        info!(
            "Connecting to MQTT broker at {} as '{}'...",
            self.endpoint, self.client_id
        );
        *self.client_state.lock().await = ClientState::Connecting;

        let mut mqtt_options =
            MqttOptions::new(&self.client_id, &self.endpoint.host, self.endpoint.port);
        mqtt_options.set_keep_alive(Duration::from_secs(10));
        mqtt_options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);

        // Drive the event loop up to the CONNACK so handshake failures
        // surface here instead of on the first publish.
        let handshake = timeout(CONNECT_TIMEOUT, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(event) => debug!("Pre-session event: {:?}", event),
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match handshake {
            Ok(Ok(())) => {
                info!("Connected to MQTT broker.");
                *self.client.lock().await = Some(client);
                *self.eventloop.lock().await = Some(eventloop);
                *self.client_state.lock().await = ClientState::Connected;
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Failed to connect to MQTT broker: {:?}", e);
                *self.client_state.lock().await = ClientState::Error(e.to_string());
                Err(SessionError::Handshake(e.to_string()))
            }
            Err(_) => {
                error!("MQTT handshake timed out after {:?}.", CONNECT_TIMEOUT);
                *self.client_state.lock().await = ClientState::Error("handshake timed out".to_string());
                Err(SessionError::Handshake("handshake timed out".to_string()))
            }
        }
    }

    async fn is_connected(&self) -> bool {
        matches!(*self.client_state.lock().await, ClientState::Connected)
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), SessionError> {
        let client = self.client.lock().await;
        let client = client.as_ref().ok_or(SessionError::NotConnected)?;
        client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn service_events(&self) {
        let mut eventloop_guard = self.eventloop.lock().await;
        let Some(eventloop) = eventloop_guard.as_mut() else {
            return;
        };

        let mut lost = false;
        loop {
            match timeout(EVENT_POLL_GRACE, eventloop.poll()).await {
                Ok(Ok(event)) => self.handle_event(&event),
                Ok(Err(e)) => {
                    error!("Error in MQTT event loop: {:?}", e);
                    lost = true;
                    break;
                }
                Err(_) => break, // nothing pending
            }
        }

        if lost {
            *eventloop_guard = None;
            *self.client.lock().await = None;
            *self.client_state.lock().await = ClientState::Disconnected;
        }
    }
}
