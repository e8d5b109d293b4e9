//! Embedded SQLite backend for the Job and History services.
//!
//! WAL mode for concurrent reads during writes, a small pool, and an
//! idempotent schema migration run at open. Blobs (`scan_config`, `results`,
//! `state`) are JSON text columns; timestamps are unix milliseconds.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::scan_engine::{LinkResult, ScanState};

use super::store::{HistoryStore, JobStore, StoreError, StoreResult};
use super::types::{HistoryPayload, JobProgress, JobStatus, JobUpdate, ScanJob};

const SCHEMA_SQL: &str = r#"
-- Scan jobs: one row per scan, blobs as JSON text
CREATE TABLE IF NOT EXISTS scan_jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    scan_url TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    started_at INTEGER,
    completed_at INTEGER,
    progress_percent REAL NOT NULL DEFAULT 0,
    current_url TEXT,
    urls_scanned INTEGER NOT NULL DEFAULT 0,
    total_urls INTEGER NOT NULL DEFAULT 0,
    broken_links INTEGER NOT NULL DEFAULT 0,
    total_links INTEGER NOT NULL DEFAULT 0,
    scan_config TEXT NOT NULL,
    error TEXT,
    results TEXT,
    state TEXT
);

-- Index for the worker's queued-job poll and the recent-jobs listing
CREATE INDEX IF NOT EXISTS idx_scan_jobs_status ON scan_jobs(status, created_at);
CREATE INDEX IF NOT EXISTS idx_scan_jobs_created ON scan_jobs(created_at DESC);

-- Completed scans, keyed by job id
CREATE TABLE IF NOT EXISTS scan_history (
    id TEXT PRIMARY KEY,
    scan_url TEXT NOT NULL,
    scan_date TEXT NOT NULL,
    duration_seconds INTEGER NOT NULL,
    config TEXT NOT NULL,
    results TEXT NOT NULL
);

-- Named config presets, written by the UI only
CREATE TABLE IF NOT EXISTS scan_configs (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    config TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

const JOB_COLUMNS: &str = "id, status, scan_url, created_at, started_at, completed_at, \
     progress_percent, current_url, urls_scanned, total_urls, broken_links, total_links, \
     scan_config, error, results, state";

#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Open or create the database at `path` and run the schema migration.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .map_err(db_error)?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_job(&self, id: &str) -> StoreResult<Option<ScanJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scan_jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref().map(job_from_row).transpose()
    }
}

impl JobStore for SqliteJobStore {
    async fn create_job(&self, url: &str, config: &ScanConfig) -> StoreResult<ScanJob> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let config_json = serde_json::to_string(config)?;

        sqlx::query(
            "INSERT INTO scan_jobs (id, status, scan_url, created_at, scan_config) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(JobStatus::Queued.as_str())
        .bind(url)
        .bind(created_at.timestamp_millis())
        .bind(&config_json)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(ScanJob {
            id,
            status: JobStatus::Queued,
            scan_url: url.to_string(),
            created_at,
            started_at: None,
            completed_at: None,
            progress_percent: 0.0,
            current_url: None,
            urls_scanned: 0,
            total_urls: 0,
            broken_links: 0,
            total_links: 0,
            scan_config: Some(config.clone()),
            error: None,
            results: None,
            state: None,
        })
    }

    async fn get_job(&self, id: &str) -> StoreResult<Option<ScanJob>> {
        self.fetch_job(id).await
    }

    async fn get_job_status(&self, id: &str) -> StoreResult<Option<JobStatus>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM scan_jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(|(raw,)| parse_status(&raw)).transpose()
    }

    async fn get_jobs(&self) -> StoreResult<Vec<ScanJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scan_jobs ORDER BY created_at DESC, id LIMIT 50"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(job_from_row).collect()
    }

    async fn get_jobs_summary(&self) -> StoreResult<Vec<ScanJob>> {
        // Same shape with the blob columns nulled out, so one row mapper
        // serves both listings.
        let rows = sqlx::query(
            "SELECT id, status, scan_url, created_at, started_at, completed_at, \
             progress_percent, current_url, urls_scanned, total_urls, broken_links, \
             total_links, NULL AS scan_config, error, NULL AS results, NULL AS state \
             FROM scan_jobs ORDER BY created_at DESC, id LIMIT 50",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(job_from_row).collect()
    }

    async fn get_next_pending_job(&self) -> StoreResult<Option<ScanJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scan_jobs WHERE status = 'queued' \
             ORDER BY created_at ASC, id LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
        update: JobUpdate,
    ) -> StoreResult<()> {
        let now = Utc::now();
        let now_ms = now.timestamp_millis();

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(
            "UPDATE scan_jobs SET \
                 status = ?1, \
                 started_at = CASE WHEN ?1 = 'running' \
                     THEN COALESCE(started_at, ?2) ELSE started_at END, \
                 completed_at = CASE WHEN ?1 IN ('completed', 'failed', 'stopped') \
                     THEN COALESCE(completed_at, ?2) ELSE completed_at END \
             WHERE id = ?3",
        )
        .bind(status.as_str())
        .bind(now_ms)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if let Some(error) = &update.error {
            sqlx::query("UPDATE scan_jobs SET error = ? WHERE id = ?")
                .bind(error)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        if let Some(urls_scanned) = update.urls_scanned {
            sqlx::query("UPDATE scan_jobs SET urls_scanned = ? WHERE id = ?")
                .bind(urls_scanned)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        if let Some(total_urls) = update.total_urls {
            sqlx::query("UPDATE scan_jobs SET total_urls = ? WHERE id = ?")
                .bind(total_urls)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        if let Some(results) = &update.results {
            let broken = results.values().filter(|e| e.is_problematic()).count() as i64;
            let total = results.len() as i64;
            sqlx::query(
                "UPDATE scan_jobs SET results = ?, broken_links = ?, total_links = ? \
                 WHERE id = ?",
            )
            .bind(serde_json::to_string(results)?)
            .bind(broken)
            .bind(total)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;

        if status == JobStatus::Completed {
            // History is best effort: a failure here is logged and does not
            // undo the job's completed status.
            match self.history_payload_for(id, now, update.results).await {
                Ok(Some(payload)) => {
                    if let Err(e) = self.save_scan(&payload, Some(id)).await {
                        warn!("Failed to save history for job {id}: {e}");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to assemble history for job {id}: {e}"),
            }
        }

        Ok(())
    }

    async fn update_job_progress(&self, id: &str, progress: &JobProgress) -> StoreResult<()> {
        sqlx::query(
            "UPDATE scan_jobs SET progress_percent = ?, current_url = ?, urls_scanned = ?, \
             total_urls = ?, broken_links = ?, total_links = ? WHERE id = ?",
        )
        .bind(progress.progress_percent)
        .bind(&progress.current_url)
        .bind(progress.urls_scanned)
        .bind(progress.total_urls)
        .bind(progress.broken_links)
        .bind(progress.total_links)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_job_state(&self, id: &str, state: &ScanState) -> StoreResult<()> {
        sqlx::query("UPDATE scan_jobs SET state = ? WHERE id = ?")
            .bind(serde_json::to_string(state)?)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn pause_job(&self, id: &str) -> StoreResult<()> {
        // Only a running job has anything to pause.
        sqlx::query("UPDATE scan_jobs SET status = 'pausing' WHERE id = ? AND status = 'running'")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn resume_job(&self, id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE scan_jobs SET status = 'queued' WHERE id = ? AND status = 'paused'")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn stop_job(&self, id: &str) -> StoreResult<()> {
        let Some(current) = self.get_job_status(id).await? else {
            return Ok(());
        };
        match current {
            JobStatus::Queued | JobStatus::Paused => {
                sqlx::query(
                    "UPDATE scan_jobs SET status = 'stopped', \
                     completed_at = COALESCE(completed_at, ?) WHERE id = ?",
                )
                .bind(Utc::now().timestamp_millis())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
            }
            JobStatus::Running | JobStatus::Pausing => {
                sqlx::query("UPDATE scan_jobs SET status = 'stopping' WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(db_error)?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn stop_all_jobs(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        sqlx::query(
            "UPDATE scan_jobs SET status = 'stopped', \
             completed_at = COALESCE(completed_at, ?) \
             WHERE status IN ('queued', 'paused')",
        )
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query(
            "UPDATE scan_jobs SET status = 'stopping' WHERE status IN ('running', 'pausing')",
        )
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn delete_job(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM scan_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn reset_orphaned_jobs(&self) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE scan_jobs SET status = 'queued' \
             WHERE status IN ('running', 'pausing', 'stopping')",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected())
    }
}

impl HistoryStore for SqliteJobStore {
    async fn save_scan(&self, payload: &HistoryPayload, id: Option<&str>) -> StoreResult<String> {
        let row_id = match id {
            Some(id) => id.to_string(),
            None => format!(
                "scan_{}_{:08x}",
                Utc::now().timestamp_millis(),
                rand::random::<u32>()
            ),
        };

        sqlx::query(
            "INSERT OR REPLACE INTO scan_history \
             (id, scan_url, scan_date, duration_seconds, config, results) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&row_id)
        .bind(&payload.scan_url)
        .bind(payload.scan_date.to_rfc3339())
        .bind(payload.duration_seconds)
        .bind(serde_json::to_string(&payload.config)?)
        .bind(serde_json::to_string(&payload.results)?)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        debug!("Saved scan history {row_id}");
        Ok(row_id)
    }
}

impl SqliteJobStore {
    /// Assemble the History payload for a just-completed job.
    async fn history_payload_for(
        &self,
        id: &str,
        completed_at: DateTime<Utc>,
        results: Option<HashMap<String, LinkResult>>,
    ) -> StoreResult<Option<HistoryPayload>> {
        let Some(job) = self.fetch_job(id).await? else {
            return Ok(None);
        };

        let duration_seconds = job
            .started_at
            .map(|started| (completed_at - started).num_seconds().max(0))
            .unwrap_or(0);

        Ok(Some(HistoryPayload {
            scan_url: job.scan_url,
            scan_date: completed_at,
            duration_seconds,
            config: job.scan_config.unwrap_or_default(),
            results: results.or(job.results).unwrap_or_default(),
        }))
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn parse_status(raw: &str) -> StoreResult<JobStatus> {
    JobStatus::parse(raw)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown job status {raw:?}")))
}

fn timestamp_from_ms(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {ms} out of range")))
}

fn job_from_row(row: &SqliteRow) -> StoreResult<ScanJob> {
    let status_raw: String = row.try_get("status").map_err(db_error)?;
    let created_ms: i64 = row.try_get("created_at").map_err(db_error)?;
    let started_ms: Option<i64> = row.try_get("started_at").map_err(db_error)?;
    let completed_ms: Option<i64> = row.try_get("completed_at").map_err(db_error)?;

    let scan_config: Option<String> = row.try_get("scan_config").map_err(db_error)?;
    let results: Option<String> = row.try_get("results").map_err(db_error)?;
    let state: Option<String> = row.try_get("state").map_err(db_error)?;

    Ok(ScanJob {
        id: row.try_get("id").map_err(db_error)?,
        status: parse_status(&status_raw)?,
        scan_url: row.try_get("scan_url").map_err(db_error)?,
        created_at: timestamp_from_ms(created_ms)?,
        started_at: started_ms.map(timestamp_from_ms).transpose()?,
        completed_at: completed_ms.map(timestamp_from_ms).transpose()?,
        progress_percent: row.try_get("progress_percent").map_err(db_error)?,
        current_url: row.try_get("current_url").map_err(db_error)?,
        urls_scanned: row.try_get("urls_scanned").map_err(db_error)?,
        total_urls: row.try_get("total_urls").map_err(db_error)?,
        broken_links: row.try_get("broken_links").map_err(db_error)?,
        total_links: row.try_get("total_links").map_err(db_error)?,
        scan_config: scan_config
            .map(|json| serde_json::from_str(&json))
            .transpose()?,
        error: row.try_get("error").map_err(db_error)?,
        results: results
            .map(|json| serde_json::from_str(&json))
            .transpose()?,
        state: state.map(|json| serde_json::from_str(&json)).transpose()?,
    })
}
