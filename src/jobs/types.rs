//! Persistent job types shared by every store backend.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::scan_engine::{LinkResult, ScanState};

/// Lifecycle states of a scan job.
///
/// `pausing` and `stopping` are requests written by the UI; the worker
/// completes them. Terminal states are `completed`, `failed`, and `stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Pausing,
    Paused,
    Stopping,
    Stopped,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "pausing" => Some(Self::Pausing),
            "paused" => Some(Self::Paused),
            "stopping" => Some(Self::Stopping),
            "stopped" => Some(Self::Stopped),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether no further transitions happen from this state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

/// A persisted scan job row.
///
/// The summary listing variant leaves the heavy blobs (`scan_config`,
/// `results`, `state`) unset.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub id: String,
    pub status: JobStatus,
    pub scan_url: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress_percent: f64,
    pub current_url: Option<String>,
    pub urls_scanned: i64,
    pub total_urls: i64,
    pub broken_links: i64,
    pub total_links: i64,
    pub scan_config: Option<ScanConfig>,
    pub error: Option<String>,
    pub results: Option<HashMap<String, LinkResult>>,
    pub state: Option<ScanState>,
}

/// Fields merged into a job row alongside a status transition.
#[derive(Debug, Default, Clone)]
pub struct JobUpdate {
    pub error: Option<String>,
    pub results: Option<HashMap<String, LinkResult>>,
    pub urls_scanned: Option<i64>,
    pub total_urls: Option<i64>,
}

/// A progress row write; designed for frequent (throttled) calls.
#[derive(Debug, Clone, Default)]
pub struct JobProgress {
    pub progress_percent: f64,
    pub current_url: Option<String>,
    pub urls_scanned: i64,
    pub total_urls: i64,
    pub broken_links: i64,
    pub total_links: i64,
}

/// Payload persisted by the History Service when a scan completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPayload {
    pub scan_url: String,
    pub scan_date: DateTime<Utc>,
    pub duration_seconds: i64,
    pub config: ScanConfig,
    pub results: HashMap<String, LinkResult>,
}
