use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::domain::{plain_text_response, ProxyError, Result, StatusCode};
use crate::ports::{BoxedStream, ResponseSink};

/// Response sink over a raw HTTP/1 connection whose request head has been read.
///
/// The connection stays wrapped in the reader used to parse the head, so
/// bytes the client pipelined behind it are replayed after a hijack.
pub struct RawHttpSink<T> {
    conn: Option<BufReader<T>>,
}

impl<T> RawHttpSink<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(conn: BufReader<T>) -> Self {
        Self { conn: Some(conn) }
    }
}

#[async_trait]
impl<T> ResponseSink for RawHttpSink<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn hijack(&mut self) -> Result<BoxedStream> {
        match self.conn.take() {
            Some(conn) => Ok(Box::new(conn)),
            None => Err(ProxyError::HijackFailed("connection already hijacked".into())),
        }
    }

    async fn respond(&mut self, status: StatusCode, body: &str) -> Result<()> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| ProxyError::HijackFailed("response written on hijacked connection".into()))?;
        conn.write_all(&plain_text_response(status, body)).await?;
        conn.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt};

    #[tokio::test]
    async fn test_hijack_replays_buffered_bytes() {
        let (mut client, server) = tokio::io::duplex(1024);
        client
            .write_all(b"CONNECT example.com:443 HTTP/1.1\r\n\r\nping")
            .await
            .unwrap();

        let mut reader = BufReader::new(server);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "\r\n");

        let mut sink = RawHttpSink::new(reader);
        let mut conn = sink.hijack().await.unwrap();

        let mut early = [0u8; 4];
        conn.read_exact(&mut early).await.unwrap();
        assert_eq!(&early, b"ping");

        conn.write_all(b"pong").await.unwrap();
        let mut pong = [0u8; 4];
        client.read_exact(&mut pong).await.unwrap();
        assert_eq!(&pong, b"pong");
    }

    #[tokio::test]
    async fn test_second_hijack_fails() {
        let (_client, server) = tokio::io::duplex(64);
        let mut sink = RawHttpSink::new(BufReader::new(server));

        assert!(sink.hijack().await.is_ok());
        assert!(matches!(sink.hijack().await, Err(ProxyError::HijackFailed(_))));
        assert!(sink.respond(StatusCode::BAD_GATEWAY, "too late").await.is_err());
    }

    #[tokio::test]
    async fn test_respond_before_hijack() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut sink = RawHttpSink::new(BufReader::new(server));

        sink.respond(StatusCode::METHOD_NOT_ALLOWED, "only CONNECT").await.unwrap();
        drop(sink);

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert!(response.ends_with("\r\n\r\nonly CONNECT"));
    }
}
