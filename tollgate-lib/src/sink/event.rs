use serde::Serialize;
use std::fmt;

/// Cap applied to the request and response excerpts carried in events.
pub const EXCERPT_LIMIT: usize = 65536;

/// Wire protocol of a completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Connect,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "HTTP"),
            Protocol::Connect => write!(f, "CONNECT"),
        }
    }
}

/// Events emitted by connection workers toward the configured sink.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProxyEvent {
    RequestCompleted {
        host: String,
        source_ip: String,
        port: u16,
        protocol: Protocol,
        bytes_sent: u64,
        bytes_received: u64,
        duration: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        ttfb: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_request_excerpt: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_excerpt: Option<String>,
    },
    RequestBlocked {
        host: String,
        source_ip: String,
    },
    RateLimited {
        source_ip: String,
        current_count: usize,
    },
}

/// Truncate to the excerpt cap, backing off to a char boundary.
pub fn excerpt(text: &str) -> String {
    if text.len() <= EXCERPT_LIMIT {
        return text.to_string();
    }
    let mut end = EXCERPT_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
