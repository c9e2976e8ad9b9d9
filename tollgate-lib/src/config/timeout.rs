use serde::Deserialize;
use std::time::Duration;

/// Timeout configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TimeoutConfig {
    /// First-request read timeout in milliseconds
    /// Default: 1000 (1 second)
    #[serde(default = "default_client_read")]
    pub client_read_ms: u64,
    /// Origin connect timeout for plain HTTP forwards, in milliseconds
    /// Default: 5000
    #[serde(default = "default_connect_http")]
    pub connect_http_ms: u64,
    /// Origin connect timeout for CONNECT tunnels, in milliseconds
    /// Default: 2000
    #[serde(default = "default_connect_https")]
    pub connect_https_ms: u64,
}

impl TimeoutConfig {
    pub fn client_read(&self) -> Duration {
        Duration::from_millis(self.client_read_ms)
    }

    pub fn connect_http(&self) -> Duration {
        Duration::from_millis(self.connect_http_ms)
    }

    pub fn connect_https(&self) -> Duration {
        Duration::from_millis(self.connect_https_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            client_read_ms: default_client_read(),
            connect_http_ms: default_connect_http(),
            connect_https_ms: default_connect_https(),
        }
    }
}

fn default_client_read() -> u64 {
    1000
}

fn default_connect_http() -> u64 {
    5000
}

fn default_connect_https() -> u64 {
    2000
}
