//! Conformance check for anything that behaves like a proxy.
//!
//! [`test_proxy`] starts a one-shot ping/pong server on a loopback port,
//! dials it through the proxy under test and checks that bytes make it across
//! in both directions. It panics on any failure, so it is meant to be called
//! from a `#[tokio::test]`.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::domain::Network;
use crate::ports::ProxyPort;

pub const PING: &[u8; 4] = b"ping";
pub const PONG: &[u8; 4] = b"pong";

pub async fn test_proxy<P>(proxy: &P)
where
    P: ProxyPort + ?Sized,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|e| panic!("Unable to listen: {}", e));
    let addr = listener
        .local_addr()
        .unwrap_or_else(|e| panic!("Unable to read listener address: {}", e));

    let server = tokio::spawn(async move {
        let (mut conn, _) = listener
            .accept()
            .await
            .unwrap_or_else(|e| panic!("Unable to accept connection: {}", e));
        let mut b = [0u8; 4];
        conn.read_exact(&mut b)
            .await
            .unwrap_or_else(|e| panic!("Unable to read from client: {}", e));
        assert_eq!(&b, PING, "Didn't receive correct ping message");
        conn.write_all(PONG)
            .await
            .unwrap_or_else(|e| panic!("Unable to write to client: {}", e));
    });

    let mut conn = proxy
        .dial(Network::Tcp, &addr.to_string())
        .await
        .unwrap_or_else(|e| panic!("Unable to dial via proxy: {}", e));

    conn.write_all(PING)
        .await
        .unwrap_or_else(|e| panic!("Unable to write to server via proxy: {}", e));

    let mut b = [0u8; 4];
    conn.read_exact(&mut b)
        .await
        .unwrap_or_else(|e| panic!("Unable to read from server: {}", e));
    assert_eq!(&b, PONG, "Didn't receive correct pong message");

    drop(conn);
    match server.await {
        Ok(()) => {}
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => panic!("Ping server did not finish: {}", e),
    }
    proxy
        .close()
        .await
        .unwrap_or_else(|e| panic!("Unable to close proxy: {}", e));
}
