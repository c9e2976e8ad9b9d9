use regex::Regex;
use std::sync::LazyLock;

static ABSOLUTE_TARGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^/]+(/.*)?$").expect("absolute target pattern"));

const CONNECTION_PREFIX: &str = "connection:";

/// Rewrite a client request for origin-form forwarding.
///
/// The request-line target loses its scheme and authority, keeping only
/// path and query (`/` when the path is absent), and the header block
/// ends up with exactly one `Connection: close` header: an existing one
/// is replaced in place, duplicates are dropped, and when none exists it
/// is inserted before the blank line that terminates the headers. Input
/// without a terminating blank line gets the header appended at the end.
/// Everything else, including the body and the CRLF separators, passes
/// through verbatim. Rewriting twice yields the same bytes.
pub fn rewrite_request(request: &str) -> String {
    let lines: Vec<&str> = request.split("\r\n").collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 1);
    out.push(rewrite_request_line(lines[0]));

    // The header block ends at the first empty line; the rest is body.
    let header_end = lines[1..]
        .iter()
        .position(|line| line.is_empty())
        .map_or(lines.len(), |i| i + 1);

    let mut connection_seen = false;
    for line in &lines[1..header_end] {
        let is_connection = line
            .get(..CONNECTION_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(CONNECTION_PREFIX));
        if is_connection {
            if !connection_seen {
                out.push("Connection: close".to_string());
                connection_seen = true;
            }
        } else {
            out.push((*line).to_string());
        }
    }
    if !connection_seen {
        out.push("Connection: close".to_string());
    }

    for line in &lines[header_end..] {
        out.push((*line).to_string());
    }
    out.join("\r\n")
}

fn rewrite_request_line(line: &str) -> String {
    let mut parts = line.splitn(3, ' ');
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return line.to_string();
    };
    let version = parts.next();

    let Some(caps) = ABSOLUTE_TARGET_RE.captures(target) else {
        return line.to_string();
    };
    let path = caps.get(1).map_or("/", |m| m.as_str());
    match version {
        Some(version) => format!("{method} {path} {version}"),
        None => format!("{method} {path}"),
    }
}
