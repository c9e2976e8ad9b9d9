use serde::Deserialize;
use std::path::PathBuf;

use super::security::RateLimitConfig;
use super::timeout::TimeoutConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Port to listen on (all interfaces)
    /// Overridden by the CLI PORT argument
    #[serde(default = "default_port")]
    pub port: u16,
    /// Size of a single socket read; also caps the buffered first request
    /// Default: 65536
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Hostnames matching any of these shell-style patterns are refused
    /// with 403 Forbidden
    /// Example: ["*.youtube.com", "*.googlevideo.com"]
    #[serde(default)]
    pub blocklist: Vec<String>,
    /// Per-source-IP admission limits
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Socket timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Emit per-request events and the shutdown summary through the sink
    /// Overridden by the CLI `Log` argument
    /// Default: false
    #[serde(default)]
    pub logging_enabled: bool,
    /// Directory the JSON file sink writes under
    /// Default: "Logs"
    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            buffer_size: default_buffer_size(),
            blocklist: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            timeouts: TimeoutConfig::default(),
            logging_enabled: false,
            log_root: default_log_root(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_buffer_size() -> usize {
    65536
}

fn default_log_root() -> PathBuf {
    PathBuf::from("Logs")
}
