//! The scan engine: bounded-concurrency URL traversal with cooperative
//! pause/resume and hard stop.
//!
//! One engine instance owns one scan run. Shared state lives in an inner
//! `Arc` cloned into every spawned fetch task; `pause()` and `stop()` can be
//! called from another task while `scan()` is running and both wait until no
//! fetch is in flight before returning the snapshot.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::{DashMap, DashSet};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use log::{debug, error, info};
use tokio::sync::{Mutex, Notify, Semaphore};
use url::Url;

use crate::config::ScanConfig;
use crate::urlnorm::UrlNormalizer;

use super::catalog::ResultCatalog;
use super::extractor;
use super::fetcher::{FetchOutcome, Fetcher};
use super::filter::{FilterDecision, PolicyFilter};
use super::progress::{ProgressUpdate, ScanObserver};
use super::rate_limiter::ScanRateLimiter;
use super::signal::Signal;
use super::types::{QueuedUrl, ScanEnd, ScanError, ScanOutcome, ScanState};

/// How one spawned task ended.
enum TaskEnd {
    /// The URL was fetched or conclusively classified.
    Processed(String),
    /// The task backed out on a pause or stop signal.
    Aborted,
}

struct EngineShared {
    config: ScanConfig,
    seed_url: String,
    normalizer: UrlNormalizer,
    filter: PolicyFilter,
    fetcher: Fetcher,
    limiter: Option<ScanRateLimiter>,

    catalog: Mutex<ResultCatalog>,
    /// URLs whose fetch has started or been conclusively classified.
    visited: DashSet<String>,
    /// URLs that have been scheduled, to prevent duplicate scheduling.
    queued: DashSet<String>,
    /// Scheduled-but-not-started URLs, for the snapshot.
    pending: DashMap<String, u32>,
    /// URLs that were in flight when pause fired; replayed first on resume.
    aborted: DashMap<String, u32>,
    queue: Mutex<VecDeque<QueuedUrl>>,

    pause: Signal,
    stop: Signal,
    running: AtomicBool,
    processed: AtomicUsize,
    idle: Notify,
}

pub struct ScanEngine {
    shared: Arc<EngineShared>,
    preseeded: bool,
}

impl ScanEngine {
    /// Build a fresh engine for `seed_url`.
    pub fn new(config: ScanConfig, seed_url: &str) -> Result<Self, ScanError> {
        Self::build(config, seed_url, ResultCatalog::new(), VecDeque::new(), false)
    }

    /// Rebuild an engine from a pause snapshot.
    ///
    /// Aborted URLs are scheduled strictly before the queued ones.
    pub fn from_snapshot(
        config: ScanConfig,
        seed_url: &str,
        state: ScanState,
    ) -> Result<Self, ScanError> {
        let queue: VecDeque<QueuedUrl> =
            state.aborted.into_iter().chain(state.queue).collect();
        let scheduled: Vec<(String, u32)> = queue
            .iter()
            .map(|item| (item.url.clone(), item.depth))
            .collect();

        let engine = Self::build(
            config,
            seed_url,
            ResultCatalog::from_entries(state.results),
            queue,
            true,
        )?;
        let shared = &engine.shared;

        for url in state.visited_links {
            shared.queued.insert(url.clone());
            shared.visited.insert(url);
        }
        for (url, depth) in scheduled {
            shared.queued.insert(url.clone());
            shared.pending.insert(url, depth);
        }
        // Progress counting continues where the paused run left off.
        shared
            .processed
            .store(shared.visited.len(), Ordering::SeqCst);

        Ok(engine)
    }

    fn build(
        config: ScanConfig,
        seed_url: &str,
        catalog: ResultCatalog,
        queue: VecDeque<QueuedUrl>,
        preseeded: bool,
    ) -> Result<Self, ScanError> {
        let seed = canonical_seed(seed_url)?;
        let filter = PolicyFilter::new(&config, &seed)?;
        let fetcher = Fetcher::new()?;
        let limiter = config
            .max_scans_per_minute
            .filter(|&limit| limit > 0)
            .map(ScanRateLimiter::new);

        Ok(Self {
            shared: Arc::new(EngineShared {
                config,
                seed_url: seed,
                normalizer: UrlNormalizer::new(),
                filter,
                fetcher,
                limiter,
                catalog: Mutex::new(catalog),
                visited: DashSet::new(),
                queued: DashSet::new(),
                pending: DashMap::new(),
                aborted: DashMap::new(),
                queue: Mutex::new(queue),
                pause: Signal::new(),
                stop: Signal::new(),
                running: AtomicBool::new(false),
                processed: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
            preseeded,
        })
    }

    /// The canonical seed URL this engine scans from.
    #[must_use]
    pub fn seed_url(&self) -> &str {
        &self.shared.seed_url
    }

    /// Run the scan to completion, pause, or stop.
    ///
    /// Per-URL failures are recorded in the catalog and never abort the run;
    /// only internal failures (a panicked task) surface as an error.
    pub async fn scan<O: ScanObserver>(&self, observer: &O) -> Result<ScanOutcome, ScanError> {
        let shared = &self.shared;
        shared.running.store(true, Ordering::SeqCst);

        if !self.preseeded {
            self.schedule_seed().await;
        }

        observer.on_start(estimate_urls(shared.config.depth));
        info!("Scanning {} at concurrency {}", shared.seed_url, shared.config.effective_concurrency());

        let concurrency = shared.config.effective_concurrency();
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut active = FuturesUnordered::new();

        loop {
            let halted = shared.pause.is_fired() || shared.stop.is_fired();
            if !halted {
                while active.len() < concurrency {
                    let item = { shared.queue.lock().await.pop_front() };
                    let Some(item) = item else { break };

                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => break,
                    };
                    let task_shared = Arc::clone(shared);
                    active.push(tokio::spawn(async move {
                        let _permit = permit;
                        process_url(task_shared, item).await
                    }));
                }
            }

            match active.next().await {
                Some(Ok(TaskEnd::Processed(url))) => {
                    debug!("Processed {url}");
                    let processed = shared.processed.fetch_add(1, Ordering::SeqCst) + 1;
                    let (broken_count, total_entries) = {
                        let catalog = shared.catalog.lock().await;
                        (catalog.broken_count(), catalog.len())
                    };
                    observer.on_progress(&ProgressUpdate {
                        processed,
                        current_url: url,
                        broken_count,
                        total_entries,
                    });
                }
                Some(Ok(TaskEnd::Aborted)) => {}
                Some(Err(join_error)) => {
                    let message = format!("scan task failed: {join_error}");
                    error!("{message}");
                    observer.on_error(&message);
                    shared.stop.fire();
                    while active.next().await.is_some() {}
                    self.mark_idle();
                    return Err(ScanError::Internal(message));
                }
                None => {
                    if halted {
                        break;
                    }
                    if shared.queue.lock().await.is_empty() {
                        break;
                    }
                }
            }
        }

        self.mark_idle();

        let end = if shared.stop.is_fired() {
            ScanEnd::Stopped
        } else if shared.pause.is_fired() {
            ScanEnd::Paused
        } else {
            ScanEnd::Completed
        };

        let catalog = shared.catalog.lock().await.clone();
        if end == ScanEnd::Completed {
            observer.on_complete(&catalog);
        }

        Ok(ScanOutcome {
            results: catalog.into_entries(),
            end,
            processed: shared.processed.load(Ordering::SeqCst),
        })
    }

    /// Soft-cancel: abort in-flight fetches for re-queue, wait until nothing
    /// is in flight, and return the resume snapshot.
    pub async fn pause(&self) -> ScanState {
        self.shared.pause.fire();
        self.wait_until_idle().await;
        self.snapshot().await
    }

    /// Hard-cancel: in-flight fetches unwind without re-queue intent.
    pub async fn stop(&self) -> ScanState {
        self.shared.stop.fire();
        self.wait_until_idle().await;
        self.snapshot().await
    }

    fn mark_idle(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.idle.notify_waiters();
    }

    async fn wait_until_idle(&self) {
        let shared = &self.shared;
        while shared.running.load(Ordering::SeqCst) {
            let notified = shared.idle.notified();
            if !shared.running.load(Ordering::SeqCst) {
                break;
            }
            notified.await;
        }
    }

    async fn schedule_seed(&self) {
        let shared = &self.shared;
        shared
            .catalog
            .lock()
            .await
            .record_discovery(&shared.seed_url, None);
        shared.queued.insert(shared.seed_url.clone());
        shared.pending.insert(shared.seed_url.clone(), 0);
        shared.queue.lock().await.push_back(QueuedUrl {
            url: shared.seed_url.clone(),
            depth: 0,
        });
    }

    /// Snapshot the current state for persistence. Clears the pending
    /// schedule; the caller owns the returned queue from here on.
    async fn snapshot(&self) -> ScanState {
        let shared = &self.shared;
        let results = shared.catalog.lock().await.entries().clone();
        let queue: Vec<QueuedUrl> = {
            let mut q = shared.queue.lock().await;
            q.drain(..).collect()
        };
        shared.pending.clear();
        let aborted: Vec<QueuedUrl> = shared
            .aborted
            .iter()
            .map(|entry| QueuedUrl {
                url: entry.key().clone(),
                depth: *entry.value(),
            })
            .collect();
        let visited_links: Vec<String> = shared.visited.iter().map(|v| v.clone()).collect();

        ScanState {
            visited_links,
            results,
            queue,
            aborted,
        }
    }
}

/// Process one scheduled URL: filter, fetch, classify, extract, schedule.
async fn process_url(shared: Arc<EngineShared>, item: QueuedUrl) -> TaskEnd {
    shared.pending.remove(&item.url);

    if shared.stop.is_fired() {
        return TaskEnd::Aborted;
    }
    if shared.pause.is_fired() {
        return requeue_for_resume(&shared, &item);
    }

    let already_visited = shared.visited.contains(&item.url);
    let same_site = match shared.filter.decide(&item.url, item.depth, already_visited) {
        FilterDecision::Skip { reason } => {
            shared.catalog.lock().await.record_skip(&item.url, &reason);
            return TaskEnd::Processed(item.url);
        }
        FilterDecision::External => {
            shared.catalog.lock().await.record_external(&item.url);
            return TaskEnd::Processed(item.url);
        }
        FilterDecision::Process { same_site } => same_site,
    };

    shared.visited.insert(item.url.clone());

    if let Some(limiter) = &shared.limiter {
        tokio::select! {
            () = shared.stop.fired() => return TaskEnd::Aborted,
            () = shared.pause.fired() => return requeue_for_resume(&shared, &item),
            () = limiter.acquire() => {}
        }
    }

    let timeout = shared.config.effective_timeout(same_site);
    let auth = shared.config.auth_header(same_site);
    let used_auth = auth.is_some();
    let want_body = depth_allows_children(&shared.config, item.depth);

    let outcome = shared
        .fetcher
        .fetch(
            &item.url,
            timeout,
            auth.as_deref(),
            want_body,
            &shared.pause,
            &shared.stop,
        )
        .await;

    match outcome {
        FetchOutcome::StopAborted => TaskEnd::Aborted,
        FetchOutcome::PauseAborted => requeue_for_resume(&shared, &item),
        FetchOutcome::TimedOut => {
            shared
                .catalog
                .lock()
                .await
                .record_timeout(&item.url, shared.config.timeout_secs(same_site));
            TaskEnd::Processed(item.url)
        }
        FetchOutcome::Failed(message) => {
            shared
                .catalog
                .lock()
                .await
                .record_error(&item.url, &message);
            TaskEnd::Processed(item.url)
        }
        FetchOutcome::Response(response) => {
            shared.catalog.lock().await.record_fetched(
                &item.url,
                response.status,
                response.content_type.clone(),
                used_auth,
            );
            if let Some(body) = response.body {
                handle_page_links(&shared, &item, &body).await;
            }
            TaskEnd::Processed(item.url)
        }
    }
}

/// A pause caught this URL mid-flight: pull it out of `visited` so the
/// resumed scan retries it, and park it in `aborted`.
fn requeue_for_resume(shared: &EngineShared, item: &QueuedUrl) -> TaskEnd {
    shared.visited.remove(&item.url);
    shared.aborted.insert(item.url.clone(), item.depth);
    TaskEnd::Aborted
}

/// Record and schedule everything extracted from a fetched HTML page.
async fn handle_page_links(shared: &Arc<EngineShared>, page: &QueuedUrl, body: &str) {
    let extraction = extractor::extract_links(body, &page.url, &shared.config, &shared.normalizer);

    {
        let mut catalog = shared.catalog.lock().await;
        for url in &extraction.selector_excluded {
            catalog.record_discovery(url, Some(&page.url));
            catalog.record_skip(url, "Excluded by CSS selector");
            if shared.config.css_selectors_force_exclude {
                shared.visited.insert(url.clone());
            }
        }
    }

    for link in extraction.links {
        schedule_link(shared, link.url, page.depth + 1, &page.url).await;
    }
}

/// Create or update the result entry for a discovered link, then schedule it.
///
/// The entry (with its `found_on` update) exists before the URL can be
/// picked up by any task.
async fn schedule_link(shared: &Arc<EngineShared>, url: String, depth: u32, found_on: &str) {
    shared
        .catalog
        .lock()
        .await
        .record_discovery(&url, Some(found_on));

    if shared.config.scan_same_link_once && !shared.queued.insert(url.clone()) {
        return;
    }

    shared.pending.insert(url.clone(), depth);
    shared.queue.lock().await.push_back(QueuedUrl { url, depth });
}

fn depth_allows_children(config: &ScanConfig, depth: u32) -> bool {
    config.depth == 0 || depth < config.depth
}

/// Canonical form of the seed URL: parsed, fragment stripped.
fn canonical_seed(seed_url: &str) -> Result<String, ScanError> {
    let mut parsed = Url::parse(seed_url).map_err(|e| ScanError::InvalidSeed {
        url: seed_url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ScanError::InvalidSeed {
            url: seed_url.to_string(),
            reason: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    parsed.set_fragment(None);
    Ok(parsed.into())
}

/// Crude advisory guess at how many URLs a scan of this depth will touch.
fn estimate_urls(depth: u32) -> usize {
    match depth {
        0 => 100,
        d => 100usize
            .saturating_mul(10usize.saturating_pow(d.saturating_sub(1)))
            .min(10_000),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_canonicalized() {
        assert_eq!(
            canonical_seed("http://a.test/page#frag").expect("valid"),
            "http://a.test/page"
        );
        assert!(canonical_seed("ftp://a.test/").is_err());
        assert!(canonical_seed("not a url").is_err());
    }

    #[test]
    fn depth_gate_for_child_extraction() {
        let unlimited = ScanConfig::default();
        assert!(depth_allows_children(&unlimited, 50));

        let bounded = ScanConfig {
            depth: 2,
            ..Default::default()
        };
        assert!(depth_allows_children(&bounded, 0));
        assert!(depth_allows_children(&bounded, 1));
        assert!(!depth_allows_children(&bounded, 2));
    }

    #[test]
    fn estimate_is_bounded() {
        assert_eq!(estimate_urls(0), 100);
        assert_eq!(estimate_urls(1), 100);
        assert_eq!(estimate_urls(2), 1_000);
        assert_eq!(estimate_urls(3), 10_000);
        assert_eq!(estimate_urls(9), 10_000);
    }
}
