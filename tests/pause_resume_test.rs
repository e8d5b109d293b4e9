//! Pause/resume behavior: cooperative soft-cancel, snapshot partitioning,
//! and one-fetch-per-URL across the paused and resumed runs.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use linkcheckerpro::ScanConfig;
use linkcheckerpro::scan_engine::{
    LinkStatus, NoOpObserver, ProgressUpdate, ResultCatalog, ScanEnd, ScanEngine, ScanObserver,
};
use tokio::sync::Notify;

use common::SlowSite;

const LINK_COUNT: usize = 50;

/// Observer that wakes a waiter on the first progress tick.
struct FirstProgress {
    notify: Arc<Notify>,
}

impl ScanObserver for FirstProgress {
    fn on_start(&self, _estimated_urls: usize) {}

    fn on_progress(&self, _update: &ProgressUpdate) {
        self.notify.notify_waiters();
    }

    fn on_error(&self, _error: &str) {}

    fn on_complete(&self, _results: &ResultCatalog) {}
}

#[tokio::test]
async fn pause_snapshot_partitions_discovered_urls_and_resume_completes() {
    let site = SlowSite::start(LINK_COUNT, Duration::from_millis(800)).await;
    let seed = site.url();

    let config = ScanConfig {
        concurrency: 5,
        ..Default::default()
    };
    let engine = Arc::new(ScanEngine::new(config.clone(), &seed).expect("engine"));

    let first_progress = Arc::new(Notify::new());
    let scan_task = {
        let engine = Arc::clone(&engine);
        let observer = FirstProgress {
            notify: Arc::clone(&first_progress),
        };
        tokio::spawn(async move { engine.scan(&observer).await })
    };

    // Pause as soon as the first URL (the seed page) has been processed;
    // the leaf fetches are still in flight at that point.
    tokio::time::timeout(Duration::from_secs(30), first_progress.notified())
        .await
        .expect("progress arrives");
    let snapshot = engine.pause().await;

    let outcome = scan_task.await.expect("join").expect("scan");
    assert_eq!(outcome.end, ScanEnd::Paused);

    // Seed + 50 links, each in exactly one bucket.
    assert_eq!(
        snapshot.visited_links.len() + snapshot.aborted.len() + snapshot.queue.len(),
        LINK_COUNT + 1,
        "visited={} aborted={} queue={}",
        snapshot.visited_links.len(),
        snapshot.aborted.len(),
        snapshot.queue.len()
    );
    assert!(
        !snapshot.aborted.is_empty(),
        "in-flight fetches must land in aborted"
    );
    assert!(snapshot.visited_links.contains(&seed));

    let mut seen = HashSet::new();
    for url in snapshot
        .visited_links
        .iter()
        .chain(snapshot.aborted.iter().map(|q| &q.url))
        .chain(snapshot.queue.iter().map(|q| &q.url))
    {
        assert!(seen.insert(url.clone()), "{url} appears in two buckets");
    }

    // Every discovered URL has a result entry before it is scheduled.
    for url in &seen {
        assert!(snapshot.results.contains_key(url), "no entry for {url}");
    }

    // URLs fetched to completion before the pause must not be fetched again.
    let completed_paths: Vec<String> = snapshot
        .visited_links
        .iter()
        .filter(|url| *url != &seed)
        .map(|url| url.rsplit_once('/').map(|(_, p)| format!("/{p}")).expect("path"))
        .collect();

    let resumed = ScanEngine::from_snapshot(config, &seed, snapshot).expect("resume engine");
    let outcome = tokio::time::timeout(
        Duration::from_secs(60),
        resumed.scan(&NoOpObserver),
    )
    .await
    .expect("resume finishes")
    .expect("scan");

    assert_eq!(outcome.end, ScanEnd::Completed);
    assert_eq!(outcome.results.len(), LINK_COUNT + 1);
    for (url, entry) in &outcome.results {
        assert_eq!(entry.status, LinkStatus::Ok, "{url} not ok: {entry:?}");
    }

    for path in completed_paths {
        assert_eq!(
            site.hits_for(&path),
            1,
            "{path} was fetched again after resume"
        );
    }
    // The seed page itself is fetched once per run at most; the resumed run
    // skips it as already scanned.
    assert_eq!(site.hits_for("/"), 1);
}

#[tokio::test]
async fn stop_halts_without_requeue_intent() {
    let site = SlowSite::start(20, Duration::from_millis(800)).await;
    let seed = site.url();

    let engine = Arc::new(
        ScanEngine::new(
            ScanConfig {
                concurrency: 4,
                ..Default::default()
            },
            &seed,
        )
        .expect("engine"),
    );

    let first_progress = Arc::new(Notify::new());
    let scan_task = {
        let engine = Arc::clone(&engine);
        let observer = FirstProgress {
            notify: Arc::clone(&first_progress),
        };
        tokio::spawn(async move { engine.scan(&observer).await })
    };

    tokio::time::timeout(Duration::from_secs(30), first_progress.notified())
        .await
        .expect("progress arrives");
    let snapshot = engine.stop().await;

    let outcome = scan_task.await.expect("join").expect("scan");
    assert_eq!(outcome.end, ScanEnd::Stopped);

    // Stop does not re-queue in-flight URLs for resume.
    assert!(snapshot.aborted.is_empty());
    // The seed page completed before the stop.
    assert!(snapshot.visited_links.contains(&seed));
}

#[tokio::test]
async fn pause_before_any_fetch_returns_everything_queued() {
    let site = SlowSite::start(5, Duration::from_millis(100)).await;
    let seed = site.url();

    let engine = ScanEngine::new(ScanConfig::default(), &seed).expect("engine");
    // Never started: the snapshot is empty and pause returns immediately.
    let snapshot = tokio::time::timeout(Duration::from_secs(5), engine.pause())
        .await
        .expect("pause does not hang");
    assert!(snapshot.visited_links.is_empty());
    assert!(snapshot.queue.is_empty());
    assert!(snapshot.aborted.is_empty());
}
