mod server;
mod sink;

pub use server::{read_request_head, RequestHead, TunnelServer, MAX_HEAD_BYTES};
pub use sink::RawHttpSink;
