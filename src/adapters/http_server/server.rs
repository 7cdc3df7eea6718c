use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::sink::RawHttpSink;
use crate::domain::{Interceptor, Method, ProxyError, Result, StatusCode, TunnelRequest};
use crate::ports::ResponseSink;

pub const MAX_HEAD_BYTES: usize = 16 * 1024;

const MAX_HEADERS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    pub target: String,
    pub host: Option<String>,
}

impl RequestHead {
    /// The CONNECT destination: the authority-form request target, or the
    /// Host header when the target is missing.
    pub fn authority(&self) -> Option<&str> {
        if !self.target.is_empty() && !self.target.starts_with('/') {
            return Some(self.target.as_str());
        }
        self.host.as_deref().filter(|host| !host.is_empty())
    }
}

/// Reads a request head, line by line, up to and including the blank line.
///
/// Nothing past the head is consumed from `reader`.
pub async fn read_request_head<R>(reader: &mut R, limit: usize) -> Result<RequestHead>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = Vec::new();
    while !(head.ends_with(b"\r\n\r\n") || head.ends_with(b"\n\n")) {
        let remaining = limit.saturating_sub(head.len());
        if remaining == 0 {
            return Err(ProxyError::InvalidRequest("request head too large".into()));
        }
        let n = (&mut *reader)
            .take(remaining as u64)
            .read_until(b'\n', &mut head)
            .await?;
        if n == 0 {
            return Err(ProxyError::InvalidRequest(
                "connection closed before end of request head".into(),
            ));
        }
    }

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    match req.parse(&head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(ProxyError::InvalidRequest("incomplete request head".into()));
        }
        Err(e) => return Err(ProxyError::InvalidRequest(e.to_string())),
    }

    let method = Method::from_bytes(req.method.unwrap_or_default().as_bytes())
        .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;
    let target = req.path.unwrap_or_default().to_string();
    let host = req
        .headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case("host"))
        .map(|header| String::from_utf8_lossy(header.value).trim().to_string());

    Ok(RequestHead { method, target, host })
}

/// Listening side of the proxy: routes CONNECT requests to the interceptor.
pub struct TunnelServer {
    interceptor: Interceptor,
    max_head_bytes: usize,
    connections: TaskTracker,
}

impl TunnelServer {
    pub fn new(interceptor: Interceptor) -> Self {
        Self {
            interceptor,
            max_head_bytes: MAX_HEAD_BYTES,
            connections: TaskTracker::new(),
        }
    }

    pub fn with_max_head_bytes(mut self, max_head_bytes: usize) -> Self {
        self.max_head_bytes = max_head_bytes;
        self
    }

    /// Accepts connections until `shutdown` is cancelled, then waits for the
    /// connections already accepted to finish.
    ///
    /// Tunnels are only torn down by `shutdown` if the interceptor was built
    /// with the same token (or a parent of it).
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) -> std::io::Result<()> {
        info!("Listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        stream.set_nodelay(true).ok();
                        let server = self.clone();
                        let shutdown = shutdown.clone();
                        self.connections.spawn(async move { server.handle(stream, peer, &shutdown).await });
                    }
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },
            }
        }

        drop(listener);
        self.connections.close();
        info!("Listener stopped, waiting for {} connection(s)", self.connections.len());
        self.connections.wait().await;
        Ok(())
    }

    pub async fn handle_connection<T>(&self, stream: T, peer: SocketAddr)
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.handle(stream, peer, &CancellationToken::new()).await
    }

    async fn handle<T>(&self, stream: T, peer: SocketAddr, shutdown: &CancellationToken)
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut reader = BufReader::new(stream);
        let head = tokio::select! {
            head = read_request_head(&mut reader, self.max_head_bytes) => head,
            // Head still incomplete at shutdown: drop the connection.
            _ = shutdown.cancelled() => return,
        };
        let mut sink = RawHttpSink::new(reader);

        let head = match head {
            Ok(head) => head,
            Err(e) => {
                debug!(%peer, "Rejecting request: {}", e);
                sink.respond(StatusCode::BAD_REQUEST, &e.to_string()).await.ok();
                return;
            }
        };

        if head.method != Method::CONNECT {
            debug!(%peer, "Rejecting {} {}", head.method, head.target);
            sink.respond(StatusCode::METHOD_NOT_ALLOWED, "Only CONNECT requests are supported")
                .await
                .ok();
            return;
        }

        let authority = match head.authority() {
            Some(authority) => authority.to_string(),
            None => {
                sink.respond(StatusCode::BAD_REQUEST, "Missing host in CONNECT request")
                    .await
                    .ok();
                return;
            }
        };

        match self
            .interceptor
            .intercept(sink, TunnelRequest::connect(authority))
            .await
        {
            Ok(stats) => debug!(%peer, ?stats, "Tunnel finished"),
            Err(e) => debug!(%peer, "Tunnel not established: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ConnectionTracker, TcpDialer};
    use tokio::io::AsyncWriteExt;

    fn server() -> TunnelServer {
        let interceptor = Interceptor::new(Arc::new(TcpDialer::new()), Arc::new(ConnectionTracker::new()));
        TunnelServer::new(interceptor)
    }

    async fn exchange(server: &TunnelServer, request: &[u8]) -> String {
        let (mut client, conn) = tokio::io::duplex(4096);
        client.write_all(request).await.unwrap();
        server.handle_connection(conn, "127.0.0.1:50000".parse().unwrap()).await;

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_read_connect_head_leaves_payload() {
        let mut reader = BufReader::new(&b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\nping"[..]);

        let head = read_request_head(&mut reader, MAX_HEAD_BYTES).await.unwrap();
        assert_eq!(head.method, Method::CONNECT);
        assert_eq!(head.authority(), Some("example.com:443"));

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"ping");
    }

    #[tokio::test]
    async fn test_authority_falls_back_to_host_header() {
        let head = RequestHead {
            method: Method::CONNECT,
            target: "/".into(),
            host: Some("example.com".into()),
        };
        assert_eq!(head.authority(), Some("example.com"));
    }

    #[tokio::test]
    async fn test_oversized_head_is_rejected() {
        let mut request = b"CONNECT example.com:443 HTTP/1.1\r\n".to_vec();
        request.extend(std::iter::repeat(b'a').take(1024));
        let mut reader = BufReader::new(&request[..]);

        let result = read_request_head(&mut reader, 128).await;
        assert!(matches!(result, Err(ProxyError::InvalidRequest(msg)) if msg.contains("too large")));
    }

    #[tokio::test]
    async fn test_truncated_head_is_rejected() {
        let mut reader = BufReader::new(&b"CONNECT example.com:443 HTTP/1.1\r\n"[..]);
        assert!(read_request_head(&mut reader, MAX_HEAD_BYTES).await.is_err());
    }

    #[tokio::test]
    async fn test_non_connect_gets_405() {
        let response = exchange(&server(), b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "got {}", response);
    }

    #[tokio::test]
    async fn test_head_over_configured_limit_gets_400() {
        let server = server().with_max_head_bytes(32);
        let response = exchange(
            &server,
            b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "got {}", response);
        assert!(response.ends_with("request head too large"), "got {}", response);
    }

    #[tokio::test]
    async fn test_serve_returns_after_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let serving = tokio::spawn(Arc::new(server()).serve(listener, shutdown.clone()));

        // Connected, but the request head never arrives.
        let _idle = tokio::net::TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(5), serving)
            .await
            .expect("serve did not return")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_garbage_gets_400() {
        let response = exchange(&server(), b"\x01\x02 nonsense\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "got {}", response);
    }
}
