use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::adapters::http_server::MAX_HEAD_BYTES;
use crate::domain::{TunnelConfig, DEFAULT_BUFFER_SIZE, DEFAULT_CONNECT_PORT};

pub const APP_NAME: &str = "nanotunnel";

pub const DEFAULT_BIND: &str = "127.0.0.1:8889";

/// Settings read from the config file. Command line flags take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind: String,
    /// `http://[user:password@]host[:port]` of a proxy to tunnel through
    pub upstream: Option<String>,
    pub connect_timeout_ms: u64,
    /// Tunnels are torn down after this long, whatever their activity
    pub max_lifetime_secs: Option<u64>,
    pub buffer_size: usize,
    pub default_port: u16,
    /// Largest request head accepted before answering 400
    pub max_head_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            upstream: None,
            connect_timeout_ms: 10_000,
            max_lifetime_secs: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            default_port: DEFAULT_CONNECT_PORT,
            max_head_bytes: MAX_HEAD_BYTES,
        }
    }
}

impl AppConfig {
    /// Loads `path`, or the per-user config file when no path is given.
    /// A missing file is created with the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, confy::ConfyError> {
        match path {
            Some(path) => confy::load_path(path),
            None => confy::load(APP_NAME, None),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn tunnel_config(&self) -> TunnelConfig {
        TunnelConfig {
            default_port: self.default_port,
            buffer_size: self.buffer_size,
            max_lifetime: self.max_lifetime_secs.map(Duration::from_secs),
        }
    }
}
