use regex::{Regex, RegexBuilder};

use crate::error::{ProxyError, Result};

/// Hostname blocklist with shell-style wildcard patterns.
///
/// Patterns support `*`, `?` and `[seq]` (with `[!seq]` negation) in the
/// usual glob sense: `*.example.com` matches `a.example.com` but not
/// `example.com`. Matching is case-insensitive. The list is compiled once
/// at startup and immutable afterwards.
pub struct Blocklist {
    patterns: Vec<Regex>,
}

impl Blocklist {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let regex = RegexBuilder::new(&glob_to_regex(pattern))
                .case_insensitive(true)
                .build()
                .map_err(|e| ProxyError::Pattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
            compiled.push(regex);
        }
        Ok(Self { patterns: compiled })
    }

    /// True if the hostname matches at least one configured pattern.
    pub fn is_blocked(&self, host: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(host))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Translate one shell glob into an anchored regex.
///
/// An unclosed `[` is a literal bracket, a leading `!` in a set negates
/// it, and a `]` right after the opening bracket is a literal member.
fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let mut j = i + 1;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    out.push_str(r"\[");
                } else {
                    out.push('[');
                    let mut k = i + 1;
                    if chars[k] == '!' {
                        out.push('^');
                        k += 1;
                    } else if chars[k] == '^' {
                        // only `!` negates a set; a leading caret is literal
                        out.push_str(r"\^");
                        k += 1;
                    }
                    while k < j {
                        match chars[k] {
                            '\\' => out.push_str(r"\\"),
                            '[' => out.push_str(r"\["),
                            ']' => out.push_str(r"\]"),
                            c => out.push(c),
                        }
                        k += 1;
                    }
                    out.push(']');
                    i = j;
                }
            }
            c if c.is_ascii_alphanumeric() => out.push(c),
            c => {
                out.push('\\');
                out.push(c);
            }
        }
        i += 1;
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocklist(patterns: &[&str]) -> Blocklist {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        Blocklist::new(&patterns).expect("valid patterns")
    }

    #[test]
    fn subdomain_wildcard() {
        let list = blocklist(&["*.example.com"]);
        assert!(list.is_blocked("a.example.com"));
        assert!(list.is_blocked("deep.a.example.com"));
        assert!(!list.is_blocked("example.com"));
        assert!(!list.is_blocked("example.org"));
    }

    #[test]
    fn blocks_when_any_pattern_matches() {
        let list = blocklist(&["*.youtube.com", "*.ytimg.com"]);
        assert!(list.is_blocked("m.youtube.com"));
        assert!(list.is_blocked("i.ytimg.com"));
        assert!(!list.is_blocked("youtube.com"));
    }

    #[test]
    fn question_mark_matches_single_char() {
        let list = blocklist(&["host?.internal"]);
        assert!(list.is_blocked("host1.internal"));
        assert!(!list.is_blocked("host12.internal"));
        assert!(!list.is_blocked("host.internal"));
    }

    #[test]
    fn character_classes() {
        let list = blocklist(&["node[0-3].cluster"]);
        assert!(list.is_blocked("node2.cluster"));
        assert!(!list.is_blocked("node7.cluster"));

        let negated = blocklist(&["node[!0-3].cluster"]);
        assert!(!negated.is_blocked("node2.cluster"));
        assert!(negated.is_blocked("node7.cluster"));
    }

    #[test]
    fn unclosed_bracket_is_literal() {
        let list = blocklist(&["weird[host"]);
        assert!(list.is_blocked("weird[host"));
        assert!(!list.is_blocked("weirdh"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let list = blocklist(&["*.Example.COM"]);
        assert!(list.is_blocked("a.example.com"));
    }

    #[test]
    fn dots_are_literal() {
        let list = blocklist(&["*.example.com"]);
        assert!(!list.is_blocked("aXexampleXcom"));
    }

    #[test]
    fn empty_list_blocks_nothing() {
        let list = blocklist(&[]);
        assert!(list.is_empty());
        assert!(!list.is_blocked("anything.at.all"));
    }
}
