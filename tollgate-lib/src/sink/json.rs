use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use super::{EventSink, ProxyEvent};
use crate::error::{ProxyError, Result};
use crate::stats::DomainSummary;

const TRAFFIC_DIR: &str = "traffic";
const BLOCKED_DIR: &str = "blocked";
const SUMMARY_DIR: &str = "summary";

/// Sink that persists one JSON document per event under a log tree:
/// completed requests under `traffic/<host>/`, blocked and rate-limited
/// records under `blocked/`, and the shutdown summary under `summary/`.
pub struct JsonFileSink {
    root: PathBuf,
}

impl JsonFileSink {
    /// Create the sink, resetting any tree left by a previous run.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if root.is_dir() {
            fs::remove_dir_all(&root).map_err(|e| {
                ProxyError::Config(format!(
                    "failed to reset log directory {}: {e}",
                    root.display()
                ))
            })?;
        }
        fs::create_dir_all(&root).map_err(|e| {
            ProxyError::Config(format!(
                "failed to create log directory {}: {e}",
                root.display()
            ))
        })?;
        Ok(Self { root })
    }

    fn write_document(
        &self,
        dir: PathBuf,
        name: String,
        value: &serde_json::Value,
    ) -> std::io::Result<()> {
        fs::create_dir_all(&dir)?;
        let payload = serde_json::to_vec_pretty(value)?;
        fs::write(dir.join(name), payload)
    }

    fn timestamp() -> String {
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

impl EventSink for JsonFileSink {
    fn emit(&self, event: &ProxyEvent) {
        let mut doc = match serde_json::to_value(event) {
            Ok(doc) => doc,
            Err(e) => {
                error!(error = %e, "failed to serialize event");
                return;
            }
        };
        doc["timestamp"] = json!(Self::timestamp());

        let result = match event {
            ProxyEvent::RequestCompleted { host, .. } => {
                let host_dir = safe_component(host);
                self.write_document(
                    self.root.join(TRAFFIC_DIR).join(&host_dir),
                    format!("{host_dir}_{}.json", Uuid::new_v4()),
                    &doc,
                )
            }
            ProxyEvent::RequestBlocked { .. } => self.write_document(
                self.root.join(BLOCKED_DIR),
                format!("blocked_{}.json", Uuid::new_v4()),
                &doc,
            ),
            ProxyEvent::RateLimited { .. } => self.write_document(
                self.root.join(BLOCKED_DIR),
                format!("rate_limited_{}.json", Uuid::new_v4()),
                &doc,
            ),
        };

        if let Err(e) = result {
            error!(error = %e, "failed to write event log");
        }
    }

    fn flush_summary(&self, summary: &BTreeMap<String, DomainSummary>) {
        let dir = self.root.join(SUMMARY_DIR);
        let write = || -> std::io::Result<()> {
            fs::create_dir_all(&dir)?;
            let payload = serde_json::to_vec_pretty(summary)?;
            fs::write(dir.join("summary.json"), payload)?;
            fs::write(dir.join("report.txt"), render_report(summary))?;
            Ok(())
        };
        match write() {
            Ok(()) => info!(path = %dir.display(), "traffic summary written"),
            Err(e) => error!(error = %e, "failed to write summary"),
        }
    }
}

/// Hostnames become directory names; keep them from escaping the tree.
fn safe_component(host: &str) -> String {
    let cleaned: String = host
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

fn render_report(summary: &BTreeMap<String, DomainSummary>) -> String {
    let total_requests: u64 = summary.values().map(|s| s.requests).sum();
    let total_sent: u64 = summary.values().map(|s| s.bytes_sent).sum();
    let total_received: u64 = summary.values().map(|s| s.bytes_received).sum();

    let mut lines = vec![
        format!("Total requests handled: {total_requests}"),
        format!("Total bytes sent: {total_sent}"),
        format!("Total bytes received: {total_received}"),
        String::new(),
        "Top 5 domains by request count:".to_string(),
    ];

    let mut ranked: Vec<_> = summary.iter().collect();
    ranked.sort_by(|a, b| b.1.requests.cmp(&a.1.requests));
    for (i, (host, s)) in ranked.iter().take(5).enumerate() {
        lines.push(format!(
            "{}. {host} - Requests: {}, Avg Duration: {:.3}s, Bytes Sent: {}, Bytes Received: {}",
            i + 1,
            s.requests,
            s.avg_duration,
            s.bytes_sent,
            s.bytes_received
        ));
    }
    lines.join("\n")
}
