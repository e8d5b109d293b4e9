//! Policy decisions for discovered URLs.
//!
//! The filter answers one question per URL: fetch it, record it as external,
//! or skip it with a reason. Checks run in a fixed order and the first match
//! wins. All patterns are compiled once per scan; invalid regexes and
//! wildcards are logged at intake and ignored from then on.

use log::warn;
use regex::Regex;

use crate::config::ScanConfig;
use crate::urlnorm::{host_of, is_proper_subdomain, registered_domain};

use super::types::ScanError;
use super::wildcard::WildcardPattern;

/// Outcome of the policy check for one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    /// Fetch the URL. `same_site` selects the timeout cap and auth policy.
    Process { same_site: bool },
    /// Record the URL as external; do not fetch.
    External,
    /// Record the URL as skipped with the given reason; do not fetch.
    Skip { reason: String },
}

pub struct PolicyFilter {
    seed_host: String,
    seed_domain: String,
    max_depth: u32,
    scan_same_link_once: bool,
    skip_external_domains: bool,
    exclude_subdomains: bool,
    wildcards: Vec<WildcardPattern>,
    regexes: Vec<(String, Regex)>,
}

impl PolicyFilter {
    /// Build a filter for one scan. Fails only if the seed URL has no host.
    pub fn new(config: &ScanConfig, seed_url: &str) -> Result<Self, ScanError> {
        let seed_host = host_of(seed_url).ok_or_else(|| ScanError::InvalidSeed {
            url: seed_url.to_string(),
            reason: "no host".to_string(),
        })?;
        let seed_domain = registered_domain(&seed_host);

        let wildcards = config
            .wildcard_exclusions
            .iter()
            .filter_map(|p| WildcardPattern::compile(p))
            .collect();

        let regexes = config
            .regex_exclusions
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some((pattern.clone(), re)),
                Err(e) => {
                    warn!("Ignoring invalid regex exclusion {pattern:?}: {e}");
                    None
                }
            })
            .collect();

        Ok(Self {
            seed_host,
            seed_domain,
            max_depth: config.depth,
            scan_same_link_once: config.scan_same_link_once,
            skip_external_domains: config.skip_external_domains,
            exclude_subdomains: config.exclude_subdomains,
            wildcards,
            regexes,
        })
    }

    /// Decide what to do with `url`, discovered at `depth`.
    ///
    /// `already_visited` is the engine's visited-set lookup; the filter never
    /// touches shared state itself.
    #[must_use]
    pub fn decide(&self, url: &str, depth: u32, already_visited: bool) -> FilterDecision {
        if self.scan_same_link_once && already_visited {
            return FilterDecision::Skip {
                reason: "Already scanned".to_string(),
            };
        }

        if self.max_depth > 0 && depth > self.max_depth {
            return FilterDecision::Skip {
                reason: "Exceeded max depth".to_string(),
            };
        }

        let Some(host) = host_of(url) else {
            return FilterDecision::Skip {
                reason: "Invalid URL".to_string(),
            };
        };

        let same_site = registered_domain(&host) == self.seed_domain;
        if !same_site && self.skip_external_domains {
            return FilterDecision::External;
        }

        if same_site
            && self.exclude_subdomains
            && is_proper_subdomain(&host, &self.seed_host)
        {
            return FilterDecision::Skip {
                reason: format!("Subdomain excluded: {host}"),
            };
        }

        for pattern in &self.wildcards {
            if pattern.matches(url) {
                return FilterDecision::Skip {
                    reason: format!("Matched wildcard exclusion: {}", pattern.raw()),
                };
            }
        }

        for (pattern, re) in &self.regexes {
            if re.is_match(url) {
                return FilterDecision::Skip {
                    reason: format!("Matched regex exclusion: {pattern}"),
                };
            }
        }

        FilterDecision::Process { same_site }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_with(config: ScanConfig) -> PolicyFilter {
        PolicyFilter::new(&config, "http://a.test/").expect("filter")
    }

    #[test]
    fn visited_urls_are_skipped_first() {
        let filter = filter_with(ScanConfig::default());
        assert_eq!(
            filter.decide("http://a.test/x", 1, true),
            FilterDecision::Skip {
                reason: "Already scanned".to_string()
            }
        );
        // With scan-once off, a visited URL is processed again.
        let refetch = filter_with(ScanConfig {
            scan_same_link_once: false,
            ..Default::default()
        });
        assert_eq!(
            refetch.decide("http://a.test/x", 1, true),
            FilterDecision::Process { same_site: true }
        );
    }

    #[test]
    fn depth_zero_means_unlimited() {
        let filter = filter_with(ScanConfig::default());
        assert_eq!(
            filter.decide("http://a.test/x", 900, false),
            FilterDecision::Process { same_site: true }
        );

        let bounded = filter_with(ScanConfig {
            depth: 2,
            ..Default::default()
        });
        assert_eq!(
            bounded.decide("http://a.test/x", 2, false),
            FilterDecision::Process { same_site: true }
        );
        assert_eq!(
            bounded.decide("http://a.test/x", 3, false),
            FilterDecision::Skip {
                reason: "Exceeded max depth".to_string()
            }
        );
    }

    #[test]
    fn off_site_urls_are_external() {
        let filter = filter_with(ScanConfig::default());
        assert_eq!(
            filter.decide("http://b.test/x", 1, false),
            FilterDecision::External
        );

        // With external skipping off, they are fetched as off-site.
        let fetching = filter_with(ScanConfig {
            skip_external_domains: false,
            ..Default::default()
        });
        assert_eq!(
            fetching.decide("http://b.test/x", 1, false),
            FilterDecision::Process { same_site: false }
        );
    }

    #[test]
    fn subdomains_are_excluded_by_default() {
        let filter = filter_with(ScanConfig::default());
        assert_eq!(
            filter.decide("http://sub.a.test/", 1, false),
            FilterDecision::Skip {
                reason: "Subdomain excluded: sub.a.test".to_string()
            }
        );
        // www is not a subdomain for this purpose.
        assert_eq!(
            filter.decide("http://www.a.test/", 1, false),
            FilterDecision::Process { same_site: true }
        );

        let allowing = filter_with(ScanConfig {
            exclude_subdomains: false,
            ..Default::default()
        });
        assert_eq!(
            allowing.decide("http://sub.a.test/", 1, false),
            FilterDecision::Process { same_site: true }
        );
    }

    #[test]
    fn wildcard_and_regex_exclusions_apply_in_order() {
        let filter = filter_with(ScanConfig {
            wildcard_exclusions: vec!["a.test/blog/*".to_string()],
            regex_exclusions: vec![r"\.pdf$".to_string()],
            ..Default::default()
        });
        assert_eq!(
            filter.decide("http://a.test/blog/post-1", 1, false),
            FilterDecision::Skip {
                reason: "Matched wildcard exclusion: a.test/blog/*".to_string()
            }
        );
        assert_eq!(
            filter.decide("http://a.test/doc.pdf", 1, false),
            FilterDecision::Skip {
                reason: "Matched regex exclusion: \\.pdf$".to_string()
            }
        );
        assert_eq!(
            filter.decide("http://a.test/about", 1, false),
            FilterDecision::Process { same_site: true }
        );
    }

    #[test]
    fn invalid_regexes_are_dropped_not_fatal() {
        let filter = filter_with(ScanConfig {
            regex_exclusions: vec!["[unclosed".to_string(), "ok-pattern".to_string()],
            ..Default::default()
        });
        assert_eq!(
            filter.decide("http://a.test/ok-pattern-here", 1, false),
            FilterDecision::Skip {
                reason: "Matched regex exclusion: ok-pattern".to_string()
            }
        );
        assert_eq!(
            filter.decide("http://a.test/other", 1, false),
            FilterDecision::Process { same_site: true }
        );
    }

    #[test]
    fn external_classification_precedes_exclusions() {
        // An off-site URL that also matches a wildcard stays external.
        let filter = filter_with(ScanConfig {
            wildcard_exclusions: vec!["b.test/*".to_string()],
            ..Default::default()
        });
        assert_eq!(
            filter.decide("http://b.test/x", 1, false),
            FilterDecision::External
        );
    }
}
