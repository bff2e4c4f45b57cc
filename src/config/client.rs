use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Connection parameters for the remote store
///
/// # Key Configuration Areas
/// - Bootstrap endpoints
/// - Connection establishment and per-request deadlines
/// - TCP/HTTP2 keepalive
/// - Compression
/// - gRPC message size limits
///
/// Watch streams are long-lived, so `request_timeout_in_ms` only bounds unary
/// calls (`get`, `put`). It is never applied at the channel level.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    /// Store endpoints, e.g. `127.0.0.1:2379` or `http://10.0.0.1:2379`
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Maximum time to wait for establishing a connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Maximum time to wait for a unary RPC response
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// TCP keepalive for idle connections
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_in_secs: u64,

    /// HTTP2 keepalive ping interval
    #[serde(default = "default_h2_keepalive_interval")]
    pub http2_keep_alive_interval_in_secs: u64,

    /// HTTP2 keepalive ping timeout
    #[serde(default = "default_h2_keepalive_timeout")]
    pub http2_keep_alive_timeout_in_secs: u64,

    /// Enable Gzip compression for network traffic
    #[serde(default = "default_enable_compression")]
    pub enable_compression: bool,

    /// Largest response the client accepts, in bytes
    #[serde(default = "default_max_decoding_message_size")]
    pub max_decoding_message_size: usize,

    /// Largest request the client sends, in bytes
    #[serde(default = "default_max_encoding_message_size")]
    pub max_encoding_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
            tcp_keepalive_in_secs: default_tcp_keepalive(),
            http2_keep_alive_interval_in_secs: default_h2_keepalive_interval(),
            http2_keep_alive_timeout_in_secs: default_h2_keepalive_timeout(),
            enable_compression: default_enable_compression(),
            max_decoding_message_size: default_max_decoding_message_size(),
            max_encoding_message_size: default_max_encoding_message_size(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "client.endpoints must contain at least one address".into(),
            )));
        }

        if let Some(blank) = self.endpoints.iter().position(|e| e.trim().is_empty()) {
            return Err(Error::Config(ConfigError::Message(format!(
                "client.endpoints[{blank}] is empty"
            ))));
        }

        if self.connect_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "client.connect_timeout_in_ms must be > 0".into(),
            )));
        }

        if self.request_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "client.request_timeout_in_ms must be > 0".into(),
            )));
        }

        if self.http2_keep_alive_timeout_in_secs >= self.http2_keep_alive_interval_in_secs {
            return Err(Error::Config(ConfigError::Message(format!(
                "client.http2_keep_alive_timeout_in_secs ({}) must be shorter than the interval ({})",
                self.http2_keep_alive_timeout_in_secs, self.http2_keep_alive_interval_in_secs
            ))));
        }

        if self.max_decoding_message_size == 0 || self.max_encoding_message_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "client message size limits must be > 0".into(),
            )));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_in_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }
}

fn default_endpoints() -> Vec<String> {
    vec!["http://127.0.0.1:2379".to_string()]
}
fn default_connect_timeout() -> u64 {
    3000
}
fn default_request_timeout() -> u64 {
    3000
}
fn default_tcp_keepalive() -> u64 {
    300
}
fn default_h2_keepalive_interval() -> u64 {
    60
}
fn default_h2_keepalive_timeout() -> u64 {
    20
}
fn default_enable_compression() -> bool {
    false
}
// Same limits as the etcd Go client: unbounded receive, 2 MiB send
fn default_max_decoding_message_size() -> usize {
    i32::MAX as usize
}
fn default_max_encoding_message_size() -> usize {
    2 * 1024 * 1024
}
