mod tcp;
mod upstream;

pub use tcp::TcpDialer;
pub use upstream::UpstreamProxyDialer;
