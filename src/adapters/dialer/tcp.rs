use async_trait::async_trait;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

use crate::domain::{Network, ProxyError, Result};
use crate::ports::{BoxedStream, DialerPort, ProxyPort};

/// Dials destinations directly over TCP.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl TcpDialer {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new() -> Self {
        Self {
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Connects to the first resolved address of `addr` that answers in time.
    pub async fn connect(&self, network: Network, addr: &str) -> Result<TcpStream> {
        let candidates: Vec<_> = lookup_host(addr)
            .await
            .map_err(|e| ProxyError::ConnectionFailed(format!("unable to resolve {}: {}", addr, e)))?
            .filter(|candidate| network.accepts(candidate))
            .collect();

        if candidates.is_empty() {
            return Err(ProxyError::ConnectionFailed(format!(
                "no {} address found for {}",
                network, addr
            )));
        }

        let mut last_error = None;
        for candidate in candidates {
            match timeout(self.connect_timeout, TcpStream::connect(candidate)).await {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true).ok();
                    return Ok(stream);
                }
                Ok(Err(e)) => {
                    log::debug!("Failed to connect to {} ({}): {}", addr, candidate, e);
                    last_error = Some(format!("{}: {}", candidate, e));
                }
                Err(_) => {
                    log::debug!("Timeout connecting to {} ({})", addr, candidate);
                    last_error = Some(format!("{}: timed out after {:?}", candidate, self.connect_timeout));
                }
            }
        }

        Err(ProxyError::ConnectionFailed(
            last_error.unwrap_or_else(|| format!("unable to connect to {}", addr)),
        ))
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DialerPort for TcpDialer {
    async fn dial(&self, network: Network, addr: &str) -> Result<BoxedStream> {
        Ok(Box::new(self.connect(network, addr).await?))
    }
}

#[async_trait]
impl ProxyPort for TcpDialer {
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let target = addr.to_string();
        let dialer = TcpDialer::new();
        let (dialed, accepted) = tokio::join!(dialer.connect(Network::Tcp, &target), listener.accept());

        let dialed = dialed.unwrap();
        let (_, peer) = accepted.unwrap();
        assert_eq!(dialed.local_addr().unwrap(), peer);
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpDialer::new().dial(Network::Tcp, &addr.to_string()).await;
        assert!(matches!(result, Err(ProxyError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_network_family_mismatch() {
        let result = TcpDialer::new().connect(Network::Tcp6, "127.0.0.1:443").await;
        match result {
            Err(ProxyError::ConnectionFailed(msg)) => assert!(msg.contains("no tcp6 address")),
            other => panic!("expected ConnectionFailed, got {:?}", other.map(|_| ())),
        }
    }
}
