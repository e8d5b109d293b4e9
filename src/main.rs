//! Worker binary: one process draining the scan-job queue.

use std::sync::Arc;

use anyhow::Context as _;
use log::info;

use linkcheckerpro::{Settings, SqliteJobStore, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let settings = Settings::from_env();
    info!(
        "Starting worker, database at {}",
        settings.database_path.display()
    );

    let store = SqliteJobStore::open(&settings.database_path)
        .await
        .context("failed to open job database")?;

    let worker = Worker::new(Arc::new(store), settings);
    worker.run().await
}
