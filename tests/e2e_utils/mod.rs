#![cfg(test)]
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod echo_server;
pub mod tunnel_server;

pub use echo_server::EchoServer;
pub use tunnel_server::TestTunnelServer;
