//! Worker process settings, read from the environment once at startup.

use std::path::PathBuf;
use std::time::Duration;

use log::warn;

const DEFAULT_DATABASE_PATH: &str = "./linkcheckerpro.sqlite";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Location of the embedded job database.
    pub database_path: PathBuf,
    /// Cadence of the queued-job poll.
    pub poll_interval: Duration,
    /// Global fetch budget injected into every job's config.
    pub max_scans_per_minute: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_scans_per_minute: None,
        }
    }
}

impl Settings {
    /// Read settings from `LINKCHECKER_*` environment variables, falling
    /// back to defaults. Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(path) = std::env::var("LINKCHECKER_DATABASE_PATH")
            && !path.is_empty()
        {
            settings.database_path = PathBuf::from(path);
        }

        if let Some(millis) =
            parse_env::<u64>("LINKCHECKER_POLL_INTERVAL_MS").filter(|&ms| ms > 0)
        {
            settings.poll_interval = Duration::from_millis(millis);
        }

        settings.max_scans_per_minute =
            parse_env::<u32>("LINKCHECKER_MAX_SCANS_PER_MINUTE").filter(|&limit| limit > 0);

        settings
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {name}={raw:?}");
            None
        }
    }
}
