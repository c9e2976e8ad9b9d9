use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{ProxyError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| ProxyError::Config(format!("Failed to read config file: {e}")))?;
    let cfg: Config = toml::from_str(&txt)
        .map_err(|e| ProxyError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.buffer_size == 0 {
        return Err(ProxyError::Config("buffer_size must be at least 1".into()));
    }
    if cfg.rate_limit.max_requests == 0 {
        return Err(ProxyError::Config("rate_limit.max_requests must be at least 1".into()));
    }
    if cfg.rate_limit.window_seconds == 0 {
        return Err(ProxyError::Config("rate_limit.window_seconds must be at least 1".into()));
    }
    Ok(())
}
