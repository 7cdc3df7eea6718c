mod e2e_utils;

use e2e_utils::TestTunnelServer;
use nanotunnel::adapters::{TcpDialer, UpstreamProxyDialer};
use nanotunnel::domain::TunnelConfig;
use nanotunnel::proxytest::test_proxy;
use std::sync::Arc;

#[tokio::test]
async fn test_direct_dialer() {
    test_proxy(&TcpDialer::new()).await;
}

#[tokio::test]
async fn test_upstream_dialer_through_tunnel_server() {
    let proxy = TestTunnelServer::start().await.expect("Failed to start tunnel server");

    test_proxy(&UpstreamProxyDialer::new(proxy.addr().to_string())).await;
}

#[tokio::test]
async fn test_chained_tunnel_servers() {
    let outer = TestTunnelServer::start().await.expect("Failed to start outer tunnel server");
    let inner = TestTunnelServer::start_with(
        Arc::new(UpstreamProxyDialer::new(outer.addr().to_string())),
        TunnelConfig::default(),
    )
    .await
    .expect("Failed to start inner tunnel server");

    test_proxy(&UpstreamProxyDialer::new(inner.addr().to_string())).await;
}
