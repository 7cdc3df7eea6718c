pub mod connection;
pub mod destination;
pub mod errors;
pub mod models;
mod pipe;
pub mod service;

pub use connection::{plain_text_response, ClientConnection, HANDSHAKE};
pub use destination::host_including_port;
pub use errors::*;
pub use models::*;
pub use service::Interceptor;
