use crate::domain::{Result, TunnelEvent, TunnelInfo};
use async_trait::async_trait;
use uuid::Uuid;

/// Port receiving tunnel lifecycle events
///
/// This is the only logging capability the domain uses.
#[async_trait]
pub trait TrackingPort: Send + Sync {
    /// Record an event for tunnel `id`
    async fn record(&self, id: Uuid, event: TunnelEvent) -> Result<()>;

    /// Get all tunnels that are still relaying
    async fn active_tunnels(&self) -> Result<Vec<TunnelInfo>>;
}
