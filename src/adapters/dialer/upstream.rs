use async_trait::async_trait;
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper::header::{HeaderValue, HOST, PROXY_AUTHORIZATION};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::tcp::TcpDialer;
use crate::domain::{Credentials, Network, ProxyError, Result};
use crate::ports::{BoxedStream, DialerPort, ProxyPort};

/// Dials destinations through an upstream HTTP proxy with a CONNECT request.
#[derive(Debug, Clone)]
pub struct UpstreamProxyDialer {
    proxy_addr: String,
    credentials: Option<Credentials>,
    tcp: TcpDialer,
}

impl UpstreamProxyDialer {
    pub fn new(proxy_addr: impl Into<String>) -> Self {
        Self {
            proxy_addr: proxy_addr.into(),
            credentials: None,
            tcp: TcpDialer::new(),
        }
    }

    /// Builds a dialer from an `http://[user:password@]host[:port]` proxy URL.
    pub fn from_url(proxy_url: &Url) -> Result<Self> {
        if proxy_url.scheme() != "http" {
            return Err(ProxyError::InvalidRequest(format!(
                "unsupported upstream proxy scheme: {}",
                proxy_url.scheme()
            )));
        }
        let host = proxy_url
            .host_str()
            .ok_or_else(|| ProxyError::InvalidRequest(format!("missing host in proxy URL {}", proxy_url)))?;
        let port = proxy_url.port_or_known_default().unwrap_or(80);

        let dialer = Self::new(format!("{}:{}", host, port));
        if proxy_url.username().is_empty() {
            return Ok(dialer);
        }
        Ok(dialer.with_credentials(Credentials::new(
            proxy_url.username().to_string(),
            proxy_url.password().unwrap_or_default().to_string(),
        )))
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.tcp = self.tcp.with_connect_timeout(connect_timeout);
        self
    }

    pub fn proxy_addr(&self) -> &str {
        &self.proxy_addr
    }

    fn connect_request(&self, addr: &str) -> Result<Request<Empty<Bytes>>> {
        let mut req = Request::builder()
            .method(Method::CONNECT)
            .uri(addr)
            .header(HOST, addr)
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProxyError::InvalidRequest(format!("invalid CONNECT target {}: {}", addr, e)))?;

        if let Some(creds) = &self.credentials {
            req.headers_mut().insert(
                PROXY_AUTHORIZATION,
                HeaderValue::from_str(&creds.to_basic_auth())
                    .map_err(|e| ProxyError::InvalidRequest(format!("{}", e)))?,
            );
        }
        Ok(req)
    }
}

#[async_trait]
impl DialerPort for UpstreamProxyDialer {
    async fn dial(&self, network: Network, addr: &str) -> Result<BoxedStream> {
        let req = self.connect_request(addr)?;
        let stream = self.tcp.connect(network, &self.proxy_addr).await?;

        let (mut sender, conn) = http1::Builder::new()
            .title_case_headers(true)
            .handshake(TokioIo::new(stream))
            .await
            .map_err(|e| ProxyError::ConnectionFailed(format!("upstream proxy {}: {}", self.proxy_addr, e)))?;

        let proxy_addr = self.proxy_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.with_upgrades().await {
                debug!("Connection to upstream proxy {} ended: {}", proxy_addr, e);
            }
        });

        let res = sender
            .send_request(req)
            .await
            .map_err(|e| ProxyError::ConnectionFailed(format!("upstream proxy {}: {}", self.proxy_addr, e)))?;

        if !res.status().is_success() {
            return Err(ProxyError::ConnectionFailed(format!(
                "upstream proxy {} refused CONNECT {}: {}",
                self.proxy_addr,
                addr,
                res.status()
            )));
        }

        let upgraded = hyper::upgrade::on(res)
            .await
            .map_err(|e| ProxyError::ConnectionFailed(format!("Server refused to upgrade: {}", e)))?;

        Ok(Box::new(TokioIo::new(upgraded)))
    }
}

#[async_trait]
impl ProxyPort for UpstreamProxyDialer {
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
