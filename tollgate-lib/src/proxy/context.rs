use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::security::{Blocklist, RateLimiter};
use crate::sink::{EventSink, NoopSink};
use crate::stats::StatsAggregator;

/// Everything a connection worker needs, built once at startup.
///
/// Keeping the shared state here instead of in process globals lets one
/// process run several independent proxy instances, which the
/// integration tests rely on.
pub struct ProxyContext {
    pub config: Arc<Config>,
    pub blocklist: Blocklist,
    pub limiter: RateLimiter,
    pub stats: StatsAggregator,
    pub sink: Arc<dyn EventSink>,
}

impl ProxyContext {
    /// Build a context from configuration with the given sink.
    pub fn new(config: Config, sink: Arc<dyn EventSink>) -> Result<Self> {
        let blocklist = Blocklist::new(&config.blocklist)?;
        let limiter = RateLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_seconds),
        );
        Ok(Self {
            config: Arc::new(config),
            blocklist,
            limiter,
            stats: StatsAggregator::new(),
            sink,
        })
    }

    /// Context with the no-op sink, for logging-disabled runs.
    pub fn with_noop_sink(config: Config) -> Result<Self> {
        Self::new(config, Arc::new(NoopSink))
    }
}
