use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::RetryPolicy;
use crate::models::ConnectionStatus;
use crate::mqtt_session::BrokerSession;
use crate::network_link::NetworkLink;
use crate::telemetry::TelemetrySource;

/// Outcome of one supervisor cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Session still down after the bounded reconnect procedure; nothing
    /// was sampled or published.
    SessionDown,
    /// Sample handed to the transport.
    Published,
    /// Transport rejected the publish; the sample is dropped.
    PublishFailed,
}

pub struct SupervisorSettings {
    pub topic: String,
    pub publish_interval: Duration,
    pub link_retry: RetryPolicy,
    pub session_retry: RetryPolicy,
}

/// The orchestration loop. State is re-derived from the collaborators at
/// the top of every cycle rather than stored here.
pub struct ConnectivitySupervisor<L, S, T> {
    link: L,
    session: S,
    source: T,
    settings: SupervisorSettings,
}

impl<L, S, T> ConnectivitySupervisor<L, S, T>
where
    L: NetworkLink,
    S: BrokerSession,
    T: TelemetrySource,
{
    pub fn new(link: L, session: S, source: T, settings: SupervisorSettings) -> Self {
        Self {
            link,
            session,
            source,
            settings,
        }
    }

    pub async fn run(&mut self) {
        loop {
            self.run_cycle().await;
            sleep(self.settings.publish_interval).await;
        }
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if self.link.status().await != ConnectionStatus::Connected {
            self.establish_link().await;
        }

        if !self.session.is_connected().await && !self.establish_session().await {
            warn!("Broker session down; skipping telemetry this cycle.");
            return CycleOutcome::SessionDown;
        }

        self.session.service_events().await;

        let sample = self.source.sample();
        let payload = sample.to_payload();
        info!("Publishing: {}", payload);

        match self.session.publish(&self.settings.topic, &payload).await {
            Ok(()) => {
                info!("Message published to '{}'.", self.settings.topic);
                CycleOutcome::Published
            }
            Err(e) => {
                error!("Failed to publish message to '{}': {}", self.settings.topic, e);
                CycleOutcome::PublishFailed
            }
        }
    }

    /// Bounded association wait: poll the link at the policy cadence until
    /// it comes up or the attempts run out. Exhaustion is tolerated; the
    /// cycle proceeds either way and the link is re-checked next cycle.
    async fn establish_link(&mut self) -> bool {
        info!("Network link down. Associating...");
        self.link.associate().await;

        let mut attempts = 0u32;
        for delay in self.settings.link_retry.delays() {
            if self.link.status().await == ConnectionStatus::Connected {
                break;
            }
            attempts += 1;
            debug!("Waiting for association (attempt {})...", attempts);
            sleep(delay).await;
        }

        if self.link.status().await == ConnectionStatus::Connected {
            info!(
                "Network link up. Local address: {:?}",
                self.link.local_address().await
            );
            true
        } else {
            warn!(
                "Network link still down after {} attempts; proceeding anyway.",
                attempts
            );
            false
        }
    }

    /// Bounded backoff reconnect. A session that stays down is surfaced to
    /// the cycle instead of blocking the loop forever; an unbounded policy
    /// restores the blocking behavior where that is wanted.
    async fn establish_session(&mut self) -> bool {
        let mut attempt = 0u32;
        for delay in self.settings.session_retry.delays() {
            attempt += 1;
            info!("Connecting to MQTT broker (attempt {})...", attempt);
            match self.session.connect().await {
                Ok(()) => {
                    info!("Broker session established.");
                    return true;
                }
                Err(e) => {
                    warn!("Broker connect failed: {}. Retrying in {:?}...", e, delay);
                    sleep(delay).await;
                }
            }
        }
        false
    }
}
