pub use hyper::{Method, StatusCode};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use uuid::Uuid;

/// Port assumed when a CONNECT target carries none.
pub const DEFAULT_CONNECT_PORT: u16 = 443;

pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

pub type RequestBody = Box<dyn AsyncRead + Send + Unpin>;

/// Network kind handed to a dialer, named after the usual socket families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Tcp4,
    Tcp6,
}

impl Network {
    pub fn as_str(&self) -> &str {
        match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
        }
    }

    pub fn accepts(&self, addr: &std::net::SocketAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct TunnelRequest {
    pub method: Method,
    pub host: String,
    body: RequestBody,
}

impl TunnelRequest {
    pub fn new(method: Method, host: impl Into<String>) -> Self {
        Self {
            method,
            host: host.into(),
            body: Box::new(tokio::io::empty()),
        }
    }

    pub fn connect(host: impl Into<String>) -> Self {
        Self::new(Method::CONNECT, host)
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn is_connect(&self) -> bool {
        self.method == Method::CONNECT
    }

    pub(crate) fn into_body(self) -> RequestBody {
        self.body
    }
}

impl fmt::Debug for TunnelRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelRequest")
            .field("method", &self.method)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Establishing,
    Relaying,
    Closed,
}

#[derive(Debug, Clone)]
pub struct TunnelInfo {
    pub id: Uuid,
    pub target: String,
    pub state: TunnelState,
    pub opened_at: Instant,
    pub closed_at: Option<Instant>,
}

impl TunnelInfo {
    pub fn new(id: Uuid, target: String) -> Self {
        Self {
            id,
            target,
            state: TunnelState::Establishing,
            opened_at: Instant::now(),
            closed_at: None,
        }
    }

    pub fn relaying(&mut self) {
        self.state = TunnelState::Relaying;
    }

    pub fn close(&mut self) {
        self.state = TunnelState::Closed;
        self.closed_at = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The upstream to client copy ended, on EOF or on an I/O error alike.
    Finished,
    Deadline,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
    pub reason: CloseReason,
}

#[derive(Debug, Clone)]
pub enum TunnelEvent {
    HijackFailed { reason: String },
    /// Hijack succeeded, the destination is being dialed.
    Dialing { target: String },
    DialFailed { target: String, reason: String },
    Established { target: String },
    HandshakeFailed { reason: String },
    ForwardClosed { bytes: u64, error: Option<String> },
    Closed { stats: Option<RelayStats> },
}

#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub default_port: u16,
    pub buffer_size: usize,
    pub max_lifetime: Option<Duration>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_CONNECT_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_lifetime: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }

    pub fn to_basic_auth(&self) -> String {
        use base64::Engine;
        let credentials = format!("{}:{}", self.username, self.password);
        format!("Basic {}", base64::prelude::BASE64_STANDARD.encode(credentials))
    }
}
