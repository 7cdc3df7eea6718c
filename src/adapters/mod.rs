pub mod dialer;
pub mod http_server;
pub mod tracking;

pub use dialer::{TcpDialer, UpstreamProxyDialer};
pub use http_server::{RawHttpSink, TunnelServer};
pub use tracking::ConnectionTracker;
