use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::connection::HANDSHAKE;
use super::{CloseReason, ProxyError, RelayStats, RequestBody, Result, TunnelConfig, TunnelEvent};
use crate::ports::{BoxedStream, TrackingPort};

/// Handshake and full-duplex relay between a hijacked client and its upstream.
pub(crate) struct Pipe {
    pub id: Uuid,
    pub tracker: Arc<dyn TrackingPort>,
    pub config: TunnelConfig,
    pub cancel: CancellationToken,
}

impl Pipe {
    /// Relays until the upstream to client direction ends.
    ///
    /// Both connections are fully released when this returns: the forward task
    /// is aborted and joined, so none of the split halves outlive the call.
    pub async fn run(&self, client: BoxedStream, upstream: BoxedStream, body: RequestBody) -> Result<RelayStats> {
        let (mut client_reader, mut client_writer) = tokio::io::split(client);
        let (mut upstream_reader, mut upstream_writer) = tokio::io::split(upstream);
        let forwarded = Arc::new(AtomicU64::new(0));

        // Must be running before the handshake goes out: clients may send
        // their first bytes right behind the CONNECT line.
        let forward = {
            let id = self.id;
            let tracker = self.tracker.clone();
            let forwarded = forwarded.clone();
            let buffer_size = self.config.buffer_size;
            tokio::spawn(async move {
                let result = copy_stream(&mut client_reader, &mut upstream_writer, buffer_size, &forwarded).await;
                upstream_writer.shutdown().await.ok();
                let event = TunnelEvent::ForwardClosed {
                    bytes: forwarded.load(Ordering::Relaxed),
                    error: result.err().map(|e| e.to_string()),
                };
                tracker.record(id, event).await.ok();
            })
        };

        drain(body).await;

        if let Err(err) = write_handshake(&mut client_writer).await {
            let reason = err.to_string();
            self.tracker
                .record(self.id, TunnelEvent::HandshakeFailed { reason: reason.clone() })
                .await
                .ok();
            forward.abort();
            forward.await.ok();
            return Err(ProxyError::HandshakeFailed(reason));
        }

        let returned = AtomicU64::new(0);
        let reason = {
            let reverse = copy_stream(&mut upstream_reader, &mut client_writer, self.config.buffer_size, &returned);
            tokio::select! {
                _ = reverse => CloseReason::Finished,
                _ = deadline(self.config.max_lifetime) => CloseReason::Deadline,
                _ = self.cancel.cancelled() => CloseReason::Cancelled,
            }
        };

        client_writer.shutdown().await.ok();
        forward.abort();
        forward.await.ok();

        Ok(RelayStats {
            client_to_upstream: forwarded.load(Ordering::Relaxed),
            upstream_to_client: returned.load(Ordering::Relaxed),
            reason,
        })
    }
}

async fn write_handshake<W>(writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(HANDSHAKE).await?;
    writer.flush().await
}

/// Reads whatever is left of the request body and releases it.
async fn drain(mut body: RequestBody) {
    tokio::io::copy(&mut body, &mut tokio::io::sink()).await.ok();
}

async fn deadline(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

/// Copies `reader` into `writer` one bounded chunk at a time, counting bytes
/// as they are written.
async fn copy_stream<R, W>(reader: &mut R, writer: &mut W, buffer_size: usize, copied: &AtomicU64) -> std::io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        copied.fetch_add(n as u64, Ordering::Relaxed);
    }
}
