//! The per-scan result catalog.
//!
//! Exactly one entry exists per canonical URL. Classification is monotone:
//! once a fetch has produced a definitive status (`ok`, `broken`, `error`)
//! the entry never moves back to `skipped` or `external`. The broken count
//! is maintained incrementally at every status mutation instead of being
//! recomputed over the full map.

use std::collections::HashMap;

use super::types::{LinkResult, LinkStatus};

#[derive(Debug, Default, Clone)]
pub struct ResultCatalog {
    entries: HashMap<String, LinkResult>,
    broken_count: usize,
}

impl ResultCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a catalog from deserialized entries, recounting broken links.
    #[must_use]
    pub fn from_entries(entries: HashMap<String, LinkResult>) -> Self {
        let broken_count = entries.values().filter(|e| e.is_problematic()).count();
        Self {
            entries,
            broken_count,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn broken_count(&self) -> usize {
        self.broken_count
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<&LinkResult> {
        self.entries.get(url)
    }

    #[must_use]
    pub fn status_of(&self, url: &str) -> Option<LinkStatus> {
        self.entries.get(url).map(|e| e.status)
    }

    #[must_use]
    pub fn entries(&self) -> &HashMap<String, LinkResult> {
        &self.entries
    }

    #[must_use]
    pub fn into_entries(self) -> HashMap<String, LinkResult> {
        self.entries
    }

    /// Record that `url` was discovered, optionally on a page.
    ///
    /// Creates the entry if needed; a repeat discovery only grows `found_on`.
    /// The seed URL is recorded with no `found_on` page.
    pub fn record_discovery(&mut self, url: &str, found_on: Option<&str>) {
        let entry = self
            .entries
            .entry(url.to_string())
            .or_insert_with(|| LinkResult::discovered(url));
        if let Some(page) = found_on {
            entry.found_on.insert(page.to_string());
        }
    }

    /// Record a fetch that produced an HTTP response.
    pub fn record_fetched(
        &mut self,
        url: &str,
        status_code: u16,
        content_type: Option<String>,
        used_auth: bool,
    ) {
        let status = if status_code < 400 {
            LinkStatus::Ok
        } else {
            LinkStatus::Broken
        };
        self.mutate(url, |entry| {
            entry.status = status;
            entry.status_code = Some(status_code);
            entry.content_type = content_type;
            entry.used_auth = used_auth;
            entry.error_message = None;
        });
    }

    /// Record a timed-out fetch as broken.
    pub fn record_timeout(&mut self, url: &str, timeout_secs: u64) {
        self.mutate(url, |entry| {
            entry.status = LinkStatus::Broken;
            entry.error_message = Some(format!("Request timed out after {timeout_secs}s"));
        });
    }

    /// Record a transport-level failure.
    pub fn record_error(&mut self, url: &str, message: &str) {
        self.mutate(url, |entry| {
            entry.status = LinkStatus::Error;
            entry.error_message = Some(message.to_string());
        });
    }

    /// Record a policy skip with its reason.
    ///
    /// Downgrades a prior `external` classification, but never a fetched one,
    /// and never overwrites an existing skip reason (a selector-excluded
    /// entry keeps its message when it is later re-skipped as already
    /// scanned).
    pub fn record_skip(&mut self, url: &str, reason: &str) {
        self.mutate(url, |entry| {
            if entry.status.is_fetched() {
                return;
            }
            if entry.status == LinkStatus::Skipped && entry.error_message.is_some() {
                return;
            }
            entry.status = LinkStatus::Skipped;
            entry.error_message = Some(reason.to_string());
        });
    }

    /// Record an off-site URL that will not be fetched.
    pub fn record_external(&mut self, url: &str) {
        self.mutate(url, |entry| {
            if entry.status.is_fetched() || entry.status == LinkStatus::External {
                return;
            }
            // A skip reason outranks the plain external classification.
            if entry.status == LinkStatus::Skipped && entry.error_message.is_some() {
                return;
            }
            entry.status = LinkStatus::External;
            entry.error_message = None;
        });
    }

    /// Apply a mutation while keeping the broken count in step.
    fn mutate(&mut self, url: &str, f: impl FnOnce(&mut LinkResult)) {
        let entry = self
            .entries
            .entry(url.to_string())
            .or_insert_with(|| LinkResult::discovered(url));
        let was_problematic = entry.is_problematic();
        f(entry);
        let is_problematic = entry.is_problematic();
        match (was_problematic, is_problematic) {
            (false, true) => self.broken_count += 1,
            (true, false) => self.broken_count -= 1,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_entry_per_url() {
        let mut catalog = ResultCatalog::new();
        catalog.record_discovery("http://a.test/x", Some("http://a.test/"));
        catalog.record_discovery("http://a.test/x", Some("http://a.test/other"));
        assert_eq!(catalog.len(), 1);
        let entry = catalog.get("http://a.test/x").expect("entry");
        assert_eq!(entry.found_on.len(), 2);
    }

    #[test]
    fn fetched_status_never_downgrades() {
        let mut catalog = ResultCatalog::new();
        catalog.record_fetched("http://a.test/x", 200, None, false);
        catalog.record_skip("http://a.test/x", "Already scanned");
        catalog.record_external("http://a.test/x");
        assert_eq!(catalog.status_of("http://a.test/x"), Some(LinkStatus::Ok));
    }

    #[test]
    fn external_downgrades_to_skipped() {
        let mut catalog = ResultCatalog::new();
        catalog.record_external("http://b.test/x");
        assert_eq!(
            catalog.status_of("http://b.test/x"),
            Some(LinkStatus::External)
        );
        catalog.record_skip("http://b.test/x", "Already scanned");
        let entry = catalog.get("http://b.test/x").expect("entry");
        assert_eq!(entry.status, LinkStatus::Skipped);
        assert_eq!(entry.error_message.as_deref(), Some("Already scanned"));
    }

    #[test]
    fn skip_reason_is_not_overwritten() {
        let mut catalog = ResultCatalog::new();
        catalog.record_skip("http://a.test/x", "Excluded by CSS selector");
        catalog.record_skip("http://a.test/x", "Already scanned");
        let entry = catalog.get("http://a.test/x").expect("entry");
        assert_eq!(
            entry.error_message.as_deref(),
            Some("Excluded by CSS selector")
        );
    }

    #[test]
    fn broken_count_tracks_mutations() {
        let mut catalog = ResultCatalog::new();
        catalog.record_fetched("http://a.test/ok", 200, None, false);
        assert_eq!(catalog.broken_count(), 0);

        catalog.record_fetched("http://a.test/404", 404, None, false);
        assert_eq!(catalog.broken_count(), 1);

        catalog.record_timeout("http://a.test/slow", 5);
        assert_eq!(catalog.broken_count(), 2);

        catalog.record_error("http://a.test/dns", "dns failure");
        assert_eq!(catalog.broken_count(), 3);

        // A retried URL that now succeeds leaves the broken set.
        catalog.record_fetched("http://a.test/slow", 200, None, false);
        assert_eq!(catalog.broken_count(), 2);
    }

    #[test]
    fn rebuild_recounts_broken_entries() {
        let mut catalog = ResultCatalog::new();
        catalog.record_fetched("http://a.test/a", 500, None, false);
        catalog.record_fetched("http://a.test/b", 200, None, false);
        let rebuilt = ResultCatalog::from_entries(catalog.into_entries());
        assert_eq!(rebuilt.broken_count(), 1);
    }
}
