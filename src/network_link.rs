use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::models::{ConnectionStatus, NetworkCredentials};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Capability seam over the uplink network interface.
#[async_trait]
pub trait NetworkLink: Send + Sync {
    /// Begin association. Completion is observed by polling `status`.
    async fn associate(&self);

    /// Non-blocking poll of the current link state.
    async fn status(&self) -> ConnectionStatus;

    /// Local address; only meaningful while Connected.
    async fn local_address(&self) -> Option<IpAddr>;
}

#[derive(Debug)]
struct LinkState {
    status: ConnectionStatus,
    local_addr: Option<IpAddr>,
}

/// Host-side network link: reachability of the configured uplink target
/// stands in for association state. `associate` starts a monitor task that
/// keeps the shared state current; `status` only reads it.
pub struct ProbeLink {
    credentials: NetworkCredentials,
    probe_addr: String,
    probe_interval: Duration,
    state: Arc<Mutex<LinkState>>,
    probe_now: Arc<Notify>,
    monitor_running: AtomicBool,
}

impl ProbeLink {
    pub fn new(credentials: NetworkCredentials, probe_addr: String, probe_interval: Duration) -> Self {
        Self {
            credentials,
            probe_addr,
            probe_interval,
            state: Arc::new(Mutex::new(LinkState {
                status: ConnectionStatus::Disconnected,
                local_addr: None,
            })),
            probe_now: Arc::new(Notify::new()),
            monitor_running: AtomicBool::new(false),
        }
    }

    async fn probe_once(probe_addr: &str, state: &Mutex<LinkState>) {
        let result = timeout(PROBE_TIMEOUT, TcpStream::connect(probe_addr)).await;
        let mut state = state.lock().await;
        match result {
            Ok(Ok(stream)) => {
                state.local_addr = stream.local_addr().ok().map(|addr| addr.ip());
                state.status = ConnectionStatus::Connected;
            }
            Ok(Err(e)) => {
                debug!("Uplink probe to {} failed: {}", probe_addr, e);
                state.local_addr = None;
                state.status = ConnectionStatus::Disconnected;
            }
            Err(_) => {
                debug!("Uplink probe to {} timed out.", probe_addr);
                state.local_addr = None;
                state.status = ConnectionStatus::Disconnected;
            }
        }
    }
}

#[async_trait]
impl NetworkLink for ProbeLink {
    async fn associate(&self) {
        info!("Connecting to network '{}'...", self.credentials.network_name);

        if self.monitor_running.swap(true, Ordering::SeqCst) {
            // Monitor already up; force an immediate probe.
            self.probe_now.notify_one();
            return;
        }

        self.state.lock().await.status = ConnectionStatus::Connecting;

        let state = self.state.clone();
        let probe_now = self.probe_now.clone();
        let probe_addr = self.probe_addr.clone();
        let probe_interval = self.probe_interval;
        tokio::spawn(async move {
            loop {
                Self::probe_once(&probe_addr, &state).await;
                tokio::select! {
                    _ = tokio::time::sleep(probe_interval) => {}
                    _ = probe_now.notified() => {}
                }
            }
        });
    }

    async fn status(&self) -> ConnectionStatus {
        self.state.lock().await.status
    }

    async fn local_address(&self) -> Option<IpAddr> {
        self.state.lock().await.local_addr
    }
}
