use regex::Regex;
use std::sync::LazyLock;

/// Target pattern for non-CONNECT requests: optional scheme, host,
/// optional port, optional path.
static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?([^/:]+)(?::(\d+))?(/.*)?$").expect("target pattern is valid")
});

/// What the first buffered bytes of a connection resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// Destination hostname, lowercased.
    pub host: String,
    pub port: u16,
    /// True for CONNECT tunnels, false for plain HTTP forwards.
    pub is_tunnel: bool,
}

/// Classify the first buffered bytes of a client connection.
///
/// Total over arbitrary input: malformed requests yield `None`, never a
/// panic. The buffer is decoded lossily, the first line is split into at
/// most three space-separated parts, and the target is interpreted per
/// method: `CONNECT` requires `host:port` with a port in [1, 65535],
/// anything else matches origin- or absolute-form with the port falling
/// back to 443 for `https://` targets and 80 otherwise.
pub fn classify(raw: &[u8]) -> Option<RequestInfo> {
    let text = String::from_utf8_lossy(raw);
    let first_line = text.lines().next()?.trim();

    let mut parts = first_line.splitn(3, ' ');
    let method = parts.next()?.to_ascii_uppercase();
    let target = parts.next()?;

    if method == "CONNECT" {
        let (host, port_str) = target.split_once(':')?;
        let port: u16 = port_str.parse().ok()?;
        if port == 0 {
            return None;
        }
        return Some(RequestInfo { host: host.to_ascii_lowercase(), port, is_tunnel: true });
    }

    let caps = TARGET_RE.captures(target)?;
    let host = caps.get(2)?.as_str();
    let port = match caps.get(3) {
        Some(m) => m.as_str().parse().ok()?,
        None if target.starts_with("https://") => 443,
        None => 80,
    };
    Some(RequestInfo { host: host.to_ascii_lowercase(), port, is_tunnel: false })
}
