use std::fmt;

#[derive(Debug, Clone)]
pub enum ProxyError {
    /// The interceptor was handed a request whose verb is not CONNECT.
    NotConnect(String),
    InvalidRequest(String),
    HijackUnsupported,
    HijackFailed(String),
    ConnectionFailed(String),
    DialFailed(String),
    HandshakeFailed(String),
    /// A raw response was requested on a connection that already carries bytes.
    AlreadyResponded,
    Io(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::NotConnect(method) => write!(f, "Intercept used for non-CONNECT request: {}", method),
            ProxyError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProxyError::HijackUnsupported => write!(f, "Response does not support hijacking"),
            ProxyError::HijackFailed(msg) => write!(f, "Hijack failed: {}", msg),
            ProxyError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            ProxyError::DialFailed(msg) => write!(f, "Dial failed: {}", msg),
            ProxyError::HandshakeFailed(msg) => write!(f, "Unable to respond OK: {}", msg),
            ProxyError::AlreadyResponded => write!(f, "Connection already carries a response"),
            ProxyError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
