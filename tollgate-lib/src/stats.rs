use ahash::AHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Per-host running totals. Mutated only under the aggregator lock.
#[derive(Debug, Default, Clone)]
struct DomainEntry {
    requests: u64,
    bytes_sent: u64,
    bytes_received: u64,
    total_duration: f64,
    total_ttfb: f64,
}

/// Reduced per-host statistics with derived averages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainSummary {
    pub requests: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub avg_duration: f64,
    pub avg_ttfb: f64,
}

/// Thread-safe per-domain traffic counters.
///
/// Counters only ever grow; averages are derived at reduction time.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    entries: Mutex<AHashMap<String, DomainEntry>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one completed request into the host's totals.
    pub fn record(
        &self,
        host: &str,
        bytes_sent: u64,
        bytes_received: u64,
        duration: f64,
        ttfb: Option<f64>,
    ) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(host.to_string()).or_default();
        entry.requests += 1;
        entry.bytes_sent += bytes_sent;
        entry.bytes_received += bytes_received;
        entry.total_duration += duration;
        if let Some(ttfb) = ttfb {
            entry.total_ttfb += ttfb;
        }
    }

    /// Snapshot the counters under the lock, then derive averages outside
    /// of it.
    pub fn reduce(&self) -> BTreeMap<String, DomainSummary> {
        let snapshot: Vec<(String, DomainEntry)> = {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.iter().map(|(host, entry)| (host.clone(), entry.clone())).collect()
        };

        snapshot
            .into_iter()
            .map(|(host, entry)| {
                let (avg_duration, avg_ttfb) = if entry.requests > 0 {
                    let count = entry.requests as f64;
                    (entry.total_duration / count, entry.total_ttfb / count)
                } else {
                    (0.0, 0.0)
                };
                let summary = DomainSummary {
                    requests: entry.requests,
                    bytes_sent: entry.bytes_sent,
                    bytes_received: entry.bytes_received,
                    avg_duration,
                    avg_ttfb,
                };
                (host, summary)
            })
            .collect()
    }
}
