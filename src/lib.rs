pub mod config;
pub mod jobs;
pub mod scan_engine;
pub mod settings;
pub mod urlnorm;
pub mod worker;

pub use config::{AuthCredentials, ScanConfig};
pub use jobs::{
    HistoryPayload, HistoryStore, JobProgress, JobStatus, JobStore, JobUpdate, ScanJob,
    SqliteJobStore, StoreError,
};
pub use scan_engine::{
    LinkResult, LinkStatus, NoOpObserver, ProgressUpdate, QueuedUrl, ResultCatalog, ScanEnd,
    ScanEngine, ScanError, ScanObserver, ScanOutcome, ScanState,
};
pub use settings::Settings;
pub use urlnorm::UrlNormalizer;
pub use worker::Worker;
