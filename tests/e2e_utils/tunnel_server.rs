#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use nanotunnel::adapters::{ConnectionTracker, TcpDialer, TunnelServer};
use nanotunnel::domain::{Interceptor, TunnelConfig};
use nanotunnel::ports::{DialerPort, TrackingPort};

pub struct TestTunnelServer {
    addr: SocketAddr,
    tracker: Arc<ConnectionTracker>,
    shutdown: CancellationToken,
    _server_handle: JoinHandle<()>,
}

impl TestTunnelServer {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        Self::start_with(Arc::new(TcpDialer::new()), TunnelConfig::default()).await
    }

    pub async fn start_with(
        dialer: Arc<dyn DialerPort>,
        config: TunnelConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let tracker = Arc::new(ConnectionTracker::new());
        let tracker_port: Arc<dyn TrackingPort> = tracker.clone();
        let shutdown = CancellationToken::new();

        let interceptor = Interceptor::new(dialer, tracker_port)
            .with_config(config)
            .with_shutdown(shutdown.clone());
        let server = Arc::new(TunnelServer::new(interceptor));

        let token = shutdown.clone();
        let server_handle = tokio::spawn(async move {
            // Silently handle errors in test
            server.serve(listener, token).await.ok();
        });

        Ok(Self {
            addr,
            tracker,
            shutdown,
            _server_handle: server_handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for TestTunnelServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
