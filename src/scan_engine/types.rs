//! Core types for scan operations: statuses, result entries, queue items,
//! and the serializable engine snapshot.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a scanned URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// Fetch returned HTTP < 400.
    Ok,
    /// Fetch returned HTTP >= 400 or timed out.
    Broken,
    /// Excluded by policy and not fetched.
    Skipped,
    /// Network-level failure (DNS, connection reset, TLS).
    Error,
    /// Off-site URL recorded without fetching.
    External,
}

impl LinkStatus {
    /// Whether this status is the outcome of an actual fetch.
    ///
    /// Fetched statuses are definitive: an entry never moves from one of
    /// these back to `Skipped` or `External`.
    #[must_use]
    pub fn is_fetched(self) -> bool {
        matches!(self, Self::Ok | Self::Broken | Self::Error)
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Broken => "broken",
            Self::Skipped => "skipped",
            Self::Error => "error",
            Self::External => "external",
        };
        f.write_str(s)
    }
}

/// One result entry per distinct canonical URL encountered in a scan.
///
/// `found_on` is a set in memory and a JSON list on the wire; iteration order
/// is not significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResult {
    pub url: String,
    pub status: LinkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub found_on: HashSet<String>,
    #[serde(default)]
    pub used_auth: bool,
}

impl LinkResult {
    /// A freshly discovered entry: no fetch has classified it yet.
    #[must_use]
    pub fn discovered(url: &str) -> Self {
        Self {
            url: url.to_string(),
            status: LinkStatus::Skipped,
            status_code: None,
            content_type: None,
            error_message: None,
            found_on: HashSet::new(),
            used_auth: false,
        }
    }

    /// Whether this entry counts toward the broken-link total.
    #[must_use]
    pub fn is_problematic(&self) -> bool {
        matches!(self.status, LinkStatus::Broken | LinkStatus::Error)
            || self.status_code.is_some_and(|code| code >= 400)
    }
}

/// An item scheduled for processing: a URL and the depth it was found at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedUrl {
    pub url: String,
    pub depth: u32,
}

/// Serializable engine snapshot written on pause, replayed on resume.
///
/// URLs in `aborted` were in flight when pause fired; on resume they are
/// scheduled strictly before the URLs in `queue`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanState {
    pub visited_links: Vec<String>,
    pub results: HashMap<String, LinkResult>,
    pub queue: Vec<QueuedUrl>,
    pub aborted: Vec<QueuedUrl>,
}

/// How a scan run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEnd {
    Completed,
    Paused,
    Stopped,
}

/// What `scan()` hands back to the caller.
#[derive(Debug)]
pub struct ScanOutcome {
    pub results: HashMap<String, LinkResult>,
    pub end: ScanEnd,
    /// URLs actually processed during this run (fetched or conclusively
    /// classified), excluding pause-aborted attempts.
    pub processed: usize,
}

/// Engine-level failures. Per-URL failures never surface here; they live in
/// the result catalog.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid seed URL {url}: {reason}")]
    InvalidSeed { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("scan task failed: {0}")]
    Internal(String),
}
