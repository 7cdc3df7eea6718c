use tokio::io::{AsyncRead, AsyncWrite};

/// Trait for a raw byte stream that can be used on either end of a tunnel
///
/// Hijacked client connections, dialed TCP sockets and upgraded upstream
/// proxy connections all satisfy it.
pub trait TunnelStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> TunnelStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn TunnelStream>;
