use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

/// Settings for [`HttpServer`](crate::net::server::HttpServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port 0 picks an ephemeral port; see `HttpServer::local_addr`.
    pub bind_addr: SocketAddr,
    /// Name of the thread `HttpServer::into_thread` serves on.
    pub thread_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            thread_name: String::from("remotecall-server"),
        }
    }
}

/// Settings for [`HttpTransport`](crate::net::transport::HttpTransport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Upper bound on one whole request/response exchange.
    pub timeout_ms: u64,
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}
