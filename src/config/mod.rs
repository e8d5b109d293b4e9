//! Scan configuration.
//!
//! A `ScanConfig` is immutable for the lifetime of a job: the UI serializes it
//! into the job row at creation and the worker deserializes it back before the
//! engine runs.

mod methods;
mod types;

pub use types::{AuthCredentials, ScanConfig};
