use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::connection::ClientConnection;
use super::destination::host_including_port;
use super::pipe::Pipe;
use super::{Network, ProxyError, RelayStats, Result, StatusCode, TunnelConfig, TunnelEvent, TunnelRequest};
use crate::ports::{DialerPort, ResponseSink, TrackingPort};

/// Turns CONNECT requests into raw tunnels to the requested destination.
#[derive(Clone)]
pub struct Interceptor {
    dialer: Arc<dyn DialerPort>,
    tracker: Arc<dyn TrackingPort>,
    config: TunnelConfig,
    shutdown: CancellationToken,
}

impl Interceptor {
    pub fn new(dialer: Arc<dyn DialerPort>, tracker: Arc<dyn TrackingPort>) -> Self {
        Self {
            dialer,
            tracker,
            config: TunnelConfig::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: TunnelConfig) -> Self {
        self.config = config;
        self
    }

    /// Tunnels still relaying when `token` is cancelled are torn down.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Hijacks the client connection behind `sink`, dials the destination of
    /// `request` and pipes data both ways until the upstream side ends.
    ///
    /// Only CONNECT requests may be passed in; anything else is rejected with
    /// [`ProxyError::NotConnect`] before the sink is touched. Failures before
    /// the tunnel exists are answered with a 502. Every connection acquired
    /// here is closed by the time this returns.
    pub async fn intercept<S>(&self, mut sink: S, request: TunnelRequest) -> Result<RelayStats>
    where
        S: ResponseSink,
    {
        if !request.is_connect() {
            return Err(ProxyError::NotConnect(request.method.to_string()));
        }
        let id = Uuid::new_v4();

        let client = match sink.hijack().await {
            Ok(stream) => ClientConnection::new(stream),
            Err(err) => {
                self.tracker
                    .record(id, TunnelEvent::HijackFailed { reason: err.to_string() })
                    .await
                    .ok();
                sink.respond(StatusCode::BAD_GATEWAY, &format!("Unable to hijack connection: {}", err))
                    .await
                    .ok();
                return Err(match err {
                    ProxyError::HijackUnsupported | ProxyError::HijackFailed(_) => err,
                    other => ProxyError::HijackFailed(other.to_string()),
                });
            }
        };

        let addr = host_including_port(&request.host, self.config.default_port);
        self.tracker
            .record(id, TunnelEvent::Dialing { target: addr.clone() })
            .await
            .ok();

        let upstream = match self.dialer.dial(Network::Tcp, &addr).await {
            Ok(stream) => stream,
            Err(err) => {
                self.tracker
                    .record(
                        id,
                        TunnelEvent::DialFailed {
                            target: addr.clone(),
                            reason: err.to_string(),
                        },
                    )
                    .await
                    .ok();
                let mut client = client;
                client
                    .reject(StatusCode::BAD_GATEWAY, &format!("Unable to handle CONNECT request: {}", err))
                    .await
                    .ok();
                client.close().await;
                return Err(ProxyError::DialFailed(format!("{}: {}", addr, err)));
            }
        };

        self.tracker
            .record(id, TunnelEvent::Established { target: addr })
            .await
            .ok();

        let pipe = Pipe {
            id,
            tracker: self.tracker.clone(),
            config: self.config.clone(),
            cancel: self.shutdown.child_token(),
        };
        let result = pipe.run(client.into_inner(), upstream, request.into_body()).await;

        self.tracker
            .record(id, TunnelEvent::Closed { stats: result.as_ref().ok().copied() })
            .await
            .ok();
        result
    }
}
