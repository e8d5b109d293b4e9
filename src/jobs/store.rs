//! The persistence capability behind the Job and History services.
//!
//! Backends implement these traits; the worker and the API layer only ever
//! talk to the traits. Backend-specific failures (including "no rows found")
//! never cross this boundary: absence is `Ok(None)`, everything else is a
//! `StoreError`.

use crate::config::ScanConfig;
use crate::scan_engine::ScanState;

use super::types::{HistoryPayload, JobProgress, JobStatus, JobUpdate, ScanJob};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or the query failed.
    #[error("job store unavailable: {0}")]
    Unavailable(String),
    /// A stored blob no longer deserializes.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}

/// Durable scan-job lifecycle operations.
pub trait JobStore: Send + Sync {
    /// Allocate an id and persist a new job with status `queued`.
    fn create_job(
        &self,
        url: &str,
        config: &ScanConfig,
    ) -> impl Future<Output = StoreResult<ScanJob>> + Send;

    /// Full job row, or `None` if the id is unknown.
    fn get_job(&self, id: &str) -> impl Future<Output = StoreResult<Option<ScanJob>>> + Send;

    /// Just the status; the hot path for polling.
    fn get_job_status(
        &self,
        id: &str,
    ) -> impl Future<Output = StoreResult<Option<JobStatus>>> + Send;

    /// The 50 most recently created jobs, newest first.
    fn get_jobs(&self) -> impl Future<Output = StoreResult<Vec<ScanJob>>> + Send;

    /// Same listing without the heavy `scan_config`/`results`/`state` blobs.
    fn get_jobs_summary(&self) -> impl Future<Output = StoreResult<Vec<ScanJob>>> + Send;

    /// The oldest `queued` job. A pure read; the caller transitions it.
    fn get_next_pending_job(&self)
    -> impl Future<Output = StoreResult<Option<ScanJob>>> + Send;

    /// Transition a job's status, merging the update fields.
    ///
    /// Stamps `started_at` on the first transition to `running` and
    /// `completed_at` on any terminal status. When `update.results` is
    /// present, recomputes `broken_links` and `total_links` from it. On
    /// transition to `completed`, persists the History record keyed by the
    /// job id.
    fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
        update: JobUpdate,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Frequent progress write; callers throttle to about 1 Hz.
    fn update_job_progress(
        &self,
        id: &str,
        progress: &JobProgress,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Persist the serialized engine snapshot for resume.
    fn update_job_state(
        &self,
        id: &str,
        state: &ScanState,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Request a pause: `running` → `pausing`. The worker completes it.
    fn pause_job(&self, id: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Re-queue a paused job; its saved state remains.
    fn resume_job(&self, id: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// `paused`/`queued` jobs go straight to `stopped`; active jobs get a
    /// `stopping` request for the worker.
    fn stop_job(&self, id: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// `stop_job` semantics across every active job.
    fn stop_all_jobs(&self) -> impl Future<Output = StoreResult<()>> + Send;

    /// Remove the job row.
    fn delete_job(&self, id: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Startup recovery: every job left in `running`/`pausing`/`stopping`
    /// goes back to `queued`. Returns how many were reset.
    fn reset_orphaned_jobs(&self) -> impl Future<Output = StoreResult<u64>> + Send;
}

/// Persistence of completed scans.
pub trait HistoryStore: Send + Sync {
    /// Write a history row, reusing `id` when given (the job id), otherwise
    /// minting a fresh `scan_<unix-ms>_<random>` id. Returns the row id.
    fn save_scan(
        &self,
        payload: &HistoryPayload,
        id: Option<&str>,
    ) -> impl Future<Output = StoreResult<String>> + Send;
}
