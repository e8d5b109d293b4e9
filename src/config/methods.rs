//! Derived configuration policy: timeouts and auth headers.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::types::ScanConfig;

/// Hard cap on off-site fetches regardless of the configured timeout.
const EXTERNAL_TIMEOUT_MS: u64 = 15_000;

impl ScanConfig {
    /// Effective fetch timeout for a URL.
    ///
    /// Same-site fetches use the configured `request_timeout`; off-site
    /// fetches are capped at 15 seconds.
    #[must_use]
    pub fn effective_timeout(&self, same_site: bool) -> Duration {
        let millis = if same_site {
            self.request_timeout
        } else {
            self.request_timeout.min(EXTERNAL_TIMEOUT_MS)
        };
        Duration::from_millis(millis)
    }

    /// The configured timeout in whole seconds, for error messages.
    #[must_use]
    pub fn timeout_secs(&self, same_site: bool) -> u64 {
        self.effective_timeout(same_site).as_secs()
    }

    /// `Authorization: Basic ...` header value for a fetch, if policy allows.
    ///
    /// Credentials are only sent to same-site hosts unless
    /// `use_auth_for_all_domains` is set.
    #[must_use]
    pub fn auth_header(&self, same_site: bool) -> Option<String> {
        let auth = self.auth.as_ref()?;
        if !same_site && !self.use_auth_for_all_domains {
            return None;
        }
        let raw = format!("{}:{}", auth.username, auth.password);
        Some(format!("Basic {}", STANDARD.encode(raw)))
    }

    /// Concurrency with a sane floor; a zero from a hand-edited config would
    /// otherwise deadlock the scheduler.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{AuthCredentials, ScanConfig};

    #[test]
    fn external_timeout_is_capped() {
        let config = ScanConfig {
            request_timeout: 30_000,
            ..Default::default()
        };
        assert_eq!(config.effective_timeout(true).as_millis(), 30_000);
        assert_eq!(config.effective_timeout(false).as_millis(), 15_000);

        let short = ScanConfig {
            request_timeout: 5_000,
            ..Default::default()
        };
        assert_eq!(short.effective_timeout(false).as_millis(), 5_000);
    }

    #[test]
    fn auth_header_respects_domain_policy() {
        let config = ScanConfig {
            auth: Some(AuthCredentials {
                username: "user".into(),
                password: "pass".into(),
            }),
            ..Default::default()
        };
        // dXNlcjpwYXNz = base64("user:pass")
        assert_eq!(
            config.auth_header(true).as_deref(),
            Some("Basic dXNlcjpwYXNz")
        );
        assert_eq!(config.auth_header(false), None);

        let everywhere = ScanConfig {
            use_auth_for_all_domains: true,
            ..config
        };
        assert!(everywhere.auth_header(false).is_some());
    }

    #[test]
    fn no_credentials_means_no_header() {
        let config = ScanConfig::default();
        assert_eq!(config.auth_header(true), None);
    }

    #[test]
    fn camel_case_round_trip() {
        let json = r#"{
            "depth": 2,
            "scanSameLinkOnce": false,
            "requestTimeout": 10000,
            "wildcardExclusions": ["a.test/blog/*"],
            "cssSelectorsForceExclude": true
        }"#;
        let config: ScanConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.depth, 2);
        assert!(!config.scan_same_link_once);
        assert_eq!(config.request_timeout, 10_000);
        assert_eq!(config.wildcard_exclusions, vec!["a.test/blog/*"]);
        assert!(config.css_selectors_force_exclude);
        // Unset fields keep their defaults.
        assert!(config.skip_external_domains);
        assert_eq!(config.concurrency, 10);

        let back = serde_json::to_value(&config).expect("serialize");
        assert_eq!(back["scanSameLinkOnce"], serde_json::json!(false));
        assert_eq!(back["excludeSubdomains"], serde_json::json!(true));
    }
}
