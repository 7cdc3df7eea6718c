use crate::domain::{Result, TunnelEvent, TunnelInfo};
use crate::ports::TrackingPort;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How long a closed tunnel stays listed before cleanup drops it.
const CLOSED_RETENTION: Duration = Duration::from_secs(4);

/// Tunnel tracker that turns lifecycle events into log records
pub struct ConnectionTracker {
    tunnels: Arc<RwLock<Vec<TunnelInfo>>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            tunnels: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Start background cleanup task
    pub fn start_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let tunnels = self.tunnels.clone();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(250));

            loop {
                ticker.tick().await;

                let mut tunnels = tunnels.write().await;
                let now = Instant::now();
                tunnels.retain(|tunnel| match tunnel.closed_at {
                    Some(closed_at) => now.duration_since(closed_at) < CLOSED_RETENTION,
                    None => true,
                });
            }
        })
    }

    /// All tracked tunnels, closed ones included until cleanup drops them
    pub async fn snapshot(&self) -> Vec<TunnelInfo> {
        self.tunnels.read().await.clone()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingPort for ConnectionTracker {
    async fn record(&self, id: Uuid, event: TunnelEvent) -> Result<()> {
        match event {
            TunnelEvent::HijackFailed { reason } => {
                warn!(tunnel = %id, "Unable to hijack connection: {}", reason);
            }
            TunnelEvent::Dialing { target } => {
                debug!(tunnel = %id, "dialing {}", target);
                self.tunnels.write().await.push(TunnelInfo::new(id, target));
            }
            TunnelEvent::DialFailed { target, reason } => {
                warn!(tunnel = %id, "CONNECT {} failed: {}", target, reason);
                if let Some(tunnel) = self.tunnels.write().await.iter_mut().find(|t| t.id == id) {
                    tunnel.close();
                }
            }
            TunnelEvent::Established { target } => {
                info!(tunnel = %id, "CONNECT {}", target);
                let mut tunnels = self.tunnels.write().await;
                match tunnels.iter_mut().find(|t| t.id == id) {
                    Some(tunnel) => tunnel.relaying(),
                    None => {
                        let mut tunnel = TunnelInfo::new(id, target);
                        tunnel.relaying();
                        tunnels.push(tunnel);
                    }
                }
            }
            TunnelEvent::HandshakeFailed { reason } => {
                error!(tunnel = %id, "Unable to respond OK: {}", reason);
            }
            TunnelEvent::ForwardClosed { bytes, error: Some(error) } => {
                debug!(tunnel = %id, bytes, "client to upstream copy failed: {}", error);
            }
            TunnelEvent::ForwardClosed { bytes, error: None } => {
                debug!(tunnel = %id, bytes, "client closed its side");
            }
            TunnelEvent::Closed { stats } => {
                let mut tunnels = self.tunnels.write().await;
                if let Some(tunnel) = tunnels.iter_mut().find(|t| t.id == id) {
                    tunnel.close();
                    match stats {
                        Some(stats) => info!(
                            tunnel = %id,
                            sent = stats.client_to_upstream,
                            received = stats.upstream_to_client,
                            reason = ?stats.reason,
                            "{} closed after {:?}",
                            tunnel.target,
                            tunnel.opened_at.elapsed()
                        ),
                        None => info!(tunnel = %id, "{} closed", tunnel.target),
                    }
                }
            }
        }

        Ok(())
    }

    async fn active_tunnels(&self) -> Result<Vec<TunnelInfo>> {
        let tunnels = self.tunnels.read().await;
        Ok(tunnels.iter().filter(|t| t.closed_at.is_none()).cloned().collect())
    }
}
