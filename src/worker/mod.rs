//! The worker loop: one process, one job at a time.
//!
//! Polls the job store for the oldest queued job, runs the scan engine over
//! it, and streams progress back. Pause and stop arrive as status values
//! written by the UI; the worker observes them on a one-second cadence and
//! relays them to the engine as cancellation signals. Progress writes are
//! throttled on the same cadence, independently.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use log::{debug, error, info, warn};
use tokio::time::MissedTickBehavior;

use crate::jobs::{JobProgress, JobStatus, JobStore, JobUpdate, ScanJob};
use crate::scan_engine::{
    ProgressUpdate, ResultCatalog, ScanEnd, ScanEngine, ScanObserver,
};
use crate::settings::Settings;

/// Which terminal transition the worker already wrote, so the post-scan path
/// does not write a second one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Paused,
    Stopped,
}

/// Observer that parks the newest progress tick for the throttled writer.
#[derive(Default)]
struct WorkerObserver {
    latest: std::sync::Mutex<Option<ProgressUpdate>>,
}

impl WorkerObserver {
    fn take_latest(&self) -> Option<ProgressUpdate> {
        self.latest.lock().ok()?.take()
    }
}

impl ScanObserver for WorkerObserver {
    fn on_start(&self, estimated_urls: usize) {
        debug!("Scan started, rough estimate {estimated_urls} URLs");
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(update.clone());
        }
    }

    fn on_error(&self, error: &str) {
        error!("Engine failure: {error}");
    }

    fn on_complete(&self, results: &ResultCatalog) {
        debug!(
            "Scan complete: {} URLs, {} broken",
            results.len(),
            results.broken_count()
        );
    }
}

pub struct Worker<S> {
    store: Arc<S>,
    settings: Settings,
}

impl<S: JobStore + 'static> Worker<S> {
    pub fn new(store: Arc<S>, settings: Settings) -> Self {
        Self { store, settings }
    }

    /// Run forever: recover orphans once, then poll and process.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.recover_orphans().await?;
        loop {
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.settings.poll_interval).await,
                Err(e) => {
                    warn!("Job poll failed: {e:#}");
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
            }
        }
    }

    /// Startup recovery: no other worker can own a job, so anything left
    /// mid-flight by a previous process goes back to the queue.
    pub async fn recover_orphans(&self) -> anyhow::Result<()> {
        let reset = self
            .store
            .reset_orphaned_jobs()
            .await
            .context("orphan cleanup failed")?;
        if reset > 0 {
            info!("Requeued {reset} orphaned job(s) from a previous run");
        }
        Ok(())
    }

    /// Process the next queued job if there is one. Returns whether a job ran.
    pub async fn process_next(&self) -> anyhow::Result<bool> {
        let Some(job) = self
            .store
            .get_next_pending_job()
            .await
            .context("queued-job poll failed")?
        else {
            return Ok(false);
        };

        if let Err(e) = self.run_job(job).await {
            error!("Job execution failed: {e:#}");
        }
        Ok(true)
    }

    async fn run_job(&self, job: ScanJob) -> anyhow::Result<()> {
        let job_id = job.id.clone();
        let resuming = job.state.is_some();
        info!(
            "{} scan job {job_id} for {}",
            if resuming { "Resuming" } else { "Starting" },
            job.scan_url
        );

        let mut config = job.scan_config.clone().unwrap_or_default();
        if let Some(limit) = self.settings.max_scans_per_minute {
            config.max_scans_per_minute = Some(limit);
        }

        let engine = match job.state {
            Some(state) => ScanEngine::from_snapshot(config, &job.scan_url, state),
            None => ScanEngine::new(config, &job.scan_url),
        };
        let engine = match engine {
            Ok(engine) => Arc::new(engine),
            Err(e) => {
                self.store
                    .update_job_status(
                        &job_id,
                        JobStatus::Failed,
                        JobUpdate {
                            error: Some(e.to_string()),
                            ..Default::default()
                        },
                    )
                    .await?;
                return Ok(());
            }
        };

        self.store
            .update_job_status(&job_id, JobStatus::Running, JobUpdate::default())
            .await
            .context("failed to mark job running")?;

        let observer = Arc::new(WorkerObserver::default());
        let mut scan_task = {
            let engine = Arc::clone(&engine);
            let observer = Arc::clone(&observer);
            tokio::spawn(async move { engine.scan(observer.as_ref()).await })
        };

        let mut stop_reason: Option<StopReason> = None;
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let scan_result = loop {
            tokio::select! {
                result = &mut scan_task => break result,
                _ = ticker.tick() => {
                    self.write_progress(&job_id, &observer).await;
                    if stop_reason.is_none() {
                        stop_reason = self.check_external_status(&job_id, &engine).await;
                    }
                }
            }
        };

        // Flush whatever the last tick missed.
        self.write_progress(&job_id, &observer).await;

        match scan_result {
            Ok(Ok(outcome)) => {
                if stop_reason.is_some() {
                    // The pause/stop transition was already written.
                    return Ok(());
                }
                match outcome.end {
                    ScanEnd::Completed => {
                        let total = outcome.results.len() as i64;
                        self.store
                            .update_job_status(
                                &job_id,
                                JobStatus::Completed,
                                JobUpdate {
                                    results: Some(outcome.results),
                                    urls_scanned: Some(outcome.processed as i64),
                                    total_urls: Some(total),
                                    error: None,
                                },
                            )
                            .await
                            .context("failed to mark job completed")?;
                        info!("Job {job_id} completed ({total} URLs)");
                    }
                    ScanEnd::Paused | ScanEnd::Stopped => {
                        // Halted without a worker-issued request; close it out.
                        self.store
                            .update_job_status(&job_id, JobStatus::Stopped, JobUpdate::default())
                            .await
                            .context("failed to mark job stopped")?;
                    }
                }
            }
            Ok(Err(scan_error)) => {
                self.store
                    .update_job_status(
                        &job_id,
                        JobStatus::Failed,
                        JobUpdate {
                            error: Some(scan_error.to_string()),
                            ..Default::default()
                        },
                    )
                    .await
                    .context("failed to mark job failed")?;
            }
            Err(join_error) => {
                self.store
                    .update_job_status(
                        &job_id,
                        JobStatus::Failed,
                        JobUpdate {
                            error: Some(format!("scan task crashed: {join_error}")),
                            ..Default::default()
                        },
                    )
                    .await
                    .context("failed to mark job failed")?;
            }
        }

        Ok(())
    }

    /// Throttled progress write. Failures are logged; the next tick retries
    /// with fresher numbers anyway.
    async fn write_progress(&self, job_id: &str, observer: &WorkerObserver) {
        let Some(update) = observer.take_latest() else {
            return;
        };
        let progress = progress_row(&update);
        if let Err(e) = self.store.update_job_progress(job_id, &progress).await {
            warn!("Progress write failed for {job_id}: {e}");
        }
    }

    /// Poll the externally visible status and relay pause/stop requests to
    /// the engine. Returns the transition written, if any.
    async fn check_external_status(
        &self,
        job_id: &str,
        engine: &Arc<ScanEngine>,
    ) -> Option<StopReason> {
        let status = match self.store.get_job_status(job_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Status poll failed for {job_id}: {e}");
                return None;
            }
        };

        match status {
            Some(JobStatus::Pausing) => {
                info!("Pause requested for job {job_id}");
                let snapshot = engine.pause().await;
                if let Err(e) = self.store.update_job_state(job_id, &snapshot).await {
                    error!("Failed to persist snapshot for {job_id}: {e}");
                }
                if let Err(e) = self
                    .store
                    .update_job_status(job_id, JobStatus::Paused, JobUpdate::default())
                    .await
                {
                    error!("Failed to mark {job_id} paused: {e}");
                }
                Some(StopReason::Paused)
            }
            Some(JobStatus::Stopping) | None => {
                info!("Stop requested for job {job_id}");
                engine.stop().await;
                if let Err(e) = self
                    .store
                    .update_job_status(job_id, JobStatus::Stopped, JobUpdate::default())
                    .await
                {
                    error!("Failed to mark {job_id} stopped: {e}");
                }
                Some(StopReason::Stopped)
            }
            Some(_) => None,
        }
    }
}

fn progress_row(update: &ProgressUpdate) -> JobProgress {
    let percent = if update.total_entries > 0 {
        (update.processed as f64 / update.total_entries as f64) * 100.0
    } else {
        0.0
    };
    JobProgress {
        progress_percent: percent.min(100.0),
        current_url: Some(update.current_url.clone()),
        urls_scanned: update.processed as i64,
        total_urls: update.total_entries as i64,
        broken_links: update.broken_count as i64,
        total_links: update.total_entries as i64,
    }
}
