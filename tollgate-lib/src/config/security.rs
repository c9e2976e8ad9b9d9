use serde::Deserialize;

/// Sliding-window admission limits, keyed by source IP
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum admissions per source IP inside one window
    /// Default: 100
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    /// Window length in seconds
    /// Default: 10
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_requests: default_max_requests(), window_seconds: default_window_seconds() }
    }
}

fn default_max_requests() -> usize {
    100
}

fn default_window_seconds() -> u64 {
    10
}
