//! Durable scan jobs and scan history.
//!
//! The `JobStore` and `HistoryStore` traits are the persistence capability;
//! `SqliteJobStore` is the embedded backend. A hosted relational backend
//! implements the same traits behind the same contract.

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteJobStore;
pub use store::{HistoryStore, JobStore, StoreError, StoreResult};
pub use types::{HistoryPayload, JobProgress, JobStatus, JobUpdate, ScanJob};
