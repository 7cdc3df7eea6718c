pub mod dialer;
pub mod hijack;
pub mod tracking;
pub mod tunnel;

pub use dialer::{DialerPort, ProxyPort};
pub use hijack::ResponseSink;
pub use tracking::TrackingPort;
pub use tunnel::{BoxedStream, TunnelStream};
