//! Progress reporting for scan runs.
//!
//! Implementations can push updates to channels, write job rows, update a
//! UI, or log. The trait keeps the engine free of any knowledge about who is
//! watching.

use super::catalog::ResultCatalog;

/// A per-URL progress tick, emitted after each fetch returns.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// URLs processed so far in this run.
    pub processed: usize,
    /// The URL that just finished.
    pub current_url: String,
    /// Entries currently counting as broken.
    pub broken_count: usize,
    /// Total result entries discovered so far.
    pub total_entries: usize,
}

/// Observer of scan lifecycle events.
pub trait ScanObserver: Send + Sync {
    /// Fired once before the first fetch. The estimate is advisory only.
    fn on_start(&self, estimated_urls: usize);

    /// Fired after each URL is processed.
    fn on_progress(&self, update: &ProgressUpdate);

    /// Fired on unexpected engine failure. Per-URL failures never land here;
    /// they are recorded in result entries.
    fn on_error(&self, error: &str);

    /// Fired with the final catalog, only when the scan ran to completion
    /// without a pause or stop.
    fn on_complete(&self, results: &ResultCatalog);
}

/// Observer that does nothing; the calls compile away.
#[derive(Debug, Clone, Copy)]
pub struct NoOpObserver;

impl ScanObserver for NoOpObserver {
    #[inline(always)]
    fn on_start(&self, _estimated_urls: usize) {}

    #[inline(always)]
    fn on_progress(&self, _update: &ProgressUpdate) {}

    #[inline(always)]
    fn on_error(&self, _error: &str) {}

    #[inline(always)]
    fn on_complete(&self, _results: &ResultCatalog) {}
}
