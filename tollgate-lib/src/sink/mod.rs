mod event;
mod json;

pub use event::{excerpt, Protocol, ProxyEvent, EXCERPT_LIMIT};
pub use json::JsonFileSink;

use std::collections::BTreeMap;

use crate::stats::DomainSummary;

/// Consumer of request, blocked and rate-limit events.
///
/// The proxy core calls `emit` once per terminal outcome and
/// `flush_summary` once at shutdown. Implementations must never fail the
/// request path; report problems and carry on.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ProxyEvent);

    /// Persist the reduced per-domain statistics. Called at shutdown when
    /// logging is enabled.
    fn flush_summary(&self, summary: &BTreeMap<String, DomainSummary>);
}

/// Sink that drops everything. Used when logging is disabled; in-memory
/// statistics still aggregate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &ProxyEvent) {}

    fn flush_summary(&self, _summary: &BTreeMap<String, DomainSummary>) {}
}
