use super::tunnel::BoxedStream;
use crate::domain::{ProxyError, Result, StatusCode};
use async_trait::async_trait;

/// Port for the response side of an inbound HTTP request
///
/// Until it is hijacked the sink answers with regular status + body
/// responses. Hijacking detaches the raw connection from HTTP framing and
/// transfers its ownership to the caller.
#[async_trait]
pub trait ResponseSink: Send {
    /// Take over the underlying connection
    async fn hijack(&mut self) -> Result<BoxedStream> {
        Err(ProxyError::HijackUnsupported)
    }

    /// Answer with `status` and a plain-text `body`
    async fn respond(&mut self, status: StatusCode, body: &str) -> Result<()>;
}
