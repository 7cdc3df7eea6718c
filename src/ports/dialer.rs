use super::tunnel::BoxedStream;
use crate::domain::{Network, Result};
use async_trait::async_trait;

/// Port for opening outbound connections
#[async_trait]
pub trait DialerPort: Send + Sync {
    /// Open a connection to `addr` (a `host:port` string) over `network`
    async fn dial(&self, network: Network, addr: &str) -> Result<BoxedStream>;
}

/// Anything that acts like a proxy: it dials destinations and owns resources
/// that must be released once it is no longer used.
#[async_trait]
pub trait ProxyPort: DialerPort {
    /// Closes the proxy and any underlying resources
    async fn close(&self) -> Result<()>;
}
