//! Wildcard exclusion patterns.
//!
//! `*` matches zero or more characters, `?` exactly one; everything else is
//! literal. Patterns are compiled to anchored regexes once per scan.
//!
//! Patterns with no scheme and no leading `*` get convenience semantics:
//! `example.com` is a host-suffix test, `example.com/blog/*` constrains the
//! host and matches the wildcard against the path.

use log::warn;
use regex::Regex;
use url::Url;

use crate::urlnorm::strip_www;

/// A compiled wildcard exclusion.
#[derive(Debug)]
pub struct WildcardPattern {
    raw: String,
    kind: PatternKind,
}

#[derive(Debug)]
enum PatternKind {
    /// Match the whole URL string.
    FullUrl(Regex),
    /// Constrain the host, then match the path.
    HostPath { host: Regex, path: Regex },
    /// Host-suffix test only.
    HostOnly(Regex),
}

impl WildcardPattern {
    /// Compile a wildcard pattern. Unusable patterns return `None` and are
    /// logged; the scan proceeds without them.
    #[must_use]
    pub fn compile(pattern: &str) -> Option<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return None;
        }

        let kind = if has_scheme(trimmed) || trimmed.starts_with('*') {
            PatternKind::FullUrl(anchored(&translate(trimmed), pattern)?)
        } else if let Some(slash) = trimmed.find('/') {
            let (host_spec, path_spec) = trimmed.split_at(slash);
            let host = host_suffix_regex(host_spec, pattern)?;
            let path = anchored(&translate(path_spec), pattern)?;
            PatternKind::HostPath { host, path }
        } else {
            PatternKind::HostOnly(host_suffix_regex(trimmed, pattern)?)
        };

        Some(Self {
            raw: trimmed.to_string(),
            kind,
        })
    }

    /// The pattern as configured, for skip messages.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Test a candidate URL against this pattern.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match &self.kind {
            PatternKind::FullUrl(re) => re.is_match(url),
            PatternKind::HostPath { host, path } => {
                let Ok(parsed) = Url::parse(url) else {
                    return false;
                };
                let Some(candidate_host) = parsed.host_str() else {
                    return false;
                };
                host.is_match(strip_www(&candidate_host.to_ascii_lowercase()))
                    && path.is_match(parsed.path())
            }
            PatternKind::HostOnly(re) => {
                let Ok(parsed) = Url::parse(url) else {
                    return false;
                };
                parsed
                    .host_str()
                    .is_some_and(|h| re.is_match(strip_www(&h.to_ascii_lowercase())))
            }
        }
    }
}

/// Translate wildcard syntax into a regex fragment, escaping everything else.
fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out
}

/// Host spec → regex accepting the host itself or any subdomain of it,
/// with `www.` normalized away.
fn host_suffix_regex(host_spec: &str, original: &str) -> Option<Regex> {
    let spec = strip_www(&host_spec.to_ascii_lowercase()).to_string();
    anchored(&format!("(?:.*\\.)?{}", translate(&spec)), original)
}

fn anchored(fragment: &str, original: &str) -> Option<Regex> {
    match Regex::new(&format!("^{fragment}$")) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Ignoring unusable wildcard exclusion {original:?}: {e}");
            None
        }
    }
}

fn has_scheme(pattern: &str) -> bool {
    pattern
        .find(':')
        .is_some_and(|i| pattern[..i].chars().all(|c| c.is_ascii_alphanumeric()))
}
