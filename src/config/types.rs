//! Core configuration types for scan jobs.

use serde::{Deserialize, Serialize};

/// Basic-auth credentials attached to a scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthCredentials {
    pub username: String,
    pub password: String,
}

/// Per-job scan configuration.
///
/// Wire format is camelCase JSON: this is what the job row's `scan_config`
/// column holds and what the UI submits. Every field has a default so partial
/// configs from older clients still deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanConfig {
    /// Maximum link depth from the seed. 0 means unlimited.
    pub depth: u32,

    /// Fetch each distinct URL at most once per scan.
    pub scan_same_link_once: bool,

    /// Cap on simultaneous outstanding fetches.
    pub concurrency: usize,

    /// Per-request timeout in milliseconds. Off-site fetches are additionally
    /// capped at 15 seconds.
    pub request_timeout: u64,

    /// Record off-site URLs without fetching them.
    pub skip_external_domains: bool,

    /// Skip hosts that are proper subdomains of the seed's registered domain.
    pub exclude_subdomains: bool,

    /// Regex patterns; any match skips the URL. Invalid patterns are logged
    /// and ignored at intake.
    pub regex_exclusions: Vec<String>,

    /// Wildcard patterns (`*` and `?`); any match skips the URL.
    pub wildcard_exclusions: Vec<String>,

    /// CSS selectors. Links inside matching elements are skipped.
    pub css_selectors: Vec<String>,

    /// Remember selector-excluded URLs as visited so later discoveries do not
    /// fetch them.
    pub css_selectors_force_exclude: bool,

    /// Optional Basic-auth credentials.
    pub auth: Option<AuthCredentials>,

    /// Send the auth header to every host instead of same-site hosts only.
    pub use_auth_for_all_domains: bool,

    /// Global token-bucket limit on fetches, engine-wide. Injected from app
    /// settings by the worker.
    pub max_scans_per_minute: Option<u32>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            depth: 0,
            scan_same_link_once: true,
            concurrency: 10,
            request_timeout: 30_000,
            skip_external_domains: true,
            exclude_subdomains: true,
            regex_exclusions: Vec::new(),
            wildcard_exclusions: Vec::new(),
            css_selectors: Vec::new(),
            css_selectors_force_exclude: false,
            auth: None,
            use_auth_for_all_domains: false,
            max_scans_per_minute: None,
        }
    }
}
