use super::{ProxyError, Result, StatusCode};
use crate::ports::BoxedStream;
use tokio::io::AsyncWriteExt;

/// Status line with an empty reason phrase, no headers and no body.
pub const HANDSHAKE: &[u8] = b"HTTP/1.1 200 \r\n\r\n";

/// Serializes a complete plain-text HTTP/1.1 response that closes the connection.
pub fn plain_text_response(status: StatusCode, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        body.len(),
        body
    )
    .into_bytes()
}

/// A hijacked client connection that has not been handed to the relay yet.
pub struct ClientConnection {
    stream: BoxedStream,
    written: bool,
}

impl ClientConnection {
    pub fn new(stream: BoxedStream) -> Self {
        Self { stream, written: false }
    }

    /// Writes a raw error response and shuts the write side down.
    ///
    /// Refused with [`ProxyError::AlreadyResponded`] once anything has been
    /// written, since a second status line would corrupt the stream.
    pub async fn reject(&mut self, status: StatusCode, body: &str) -> Result<()> {
        if self.written {
            return Err(ProxyError::AlreadyResponded);
        }
        self.written = true;
        self.stream.write_all(&plain_text_response(status, body)).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Releases the connection. Errors from an already closed peer are ignored.
    pub async fn close(mut self) {
        self.stream.shutdown().await.ok();
    }

    pub fn into_inner(self) -> BoxedStream {
        self.stream
    }
}
