//! Anchor extraction from fetched HTML.
//!
//! Parses the document with a forgiving parser, applies CSS-selector
//! exclusions, and yields normalized link URLs together with a short
//! surrounding-HTML context snippet for display.

use std::collections::HashSet;

use ego_tree::NodeId;
use log::warn;
use scraper::{ElementRef, Html, Selector};

use crate::config::ScanConfig;
use crate::urlnorm::UrlNormalizer;

/// Upper bound on the serialized context snippet.
const CONTEXT_MAX_CHARS: usize = 300;

/// One extracted anchor: where it points and what surrounds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub url: String,
    pub context: String,
}

/// Everything one page yields.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    /// Links to schedule, in document order, deduplicated.
    pub links: Vec<ExtractedLink>,
    /// Normalized URLs excluded by a CSS selector on this page.
    pub selector_excluded: Vec<String>,
}

/// Extract anchors from `html` fetched at `page_url`.
pub fn extract_links(
    html: &str,
    page_url: &str,
    config: &ScanConfig,
    normalizer: &UrlNormalizer,
) -> ExtractionOutcome {
    let document = Html::parse_document(html);

    let anchor_selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(e) => {
            // Unreachable for a literal selector, but never panic on page input.
            warn!("Anchor selector failed to parse: {e}");
            return ExtractionOutcome::default();
        }
    };

    let mut outcome = ExtractionOutcome::default();
    let mut excluded_nodes: HashSet<NodeId> = HashSet::new();
    let mut excluded_urls: HashSet<String> = HashSet::new();

    for raw_selector in &config.css_selectors {
        let selector = match Selector::parse(raw_selector) {
            Ok(s) => s,
            Err(e) => {
                warn!("Ignoring invalid CSS selector {raw_selector:?}: {e}");
                continue;
            }
        };
        for element in document.select(&selector) {
            for anchor in anchors_within(element, &anchor_selector) {
                excluded_nodes.insert(anchor.id());
                if let Some(href) = anchor.value().attr("href")
                    && let Some(url) = normalizer.normalize(href, page_url)
                    && excluded_urls.insert(url.clone())
                {
                    outcome.selector_excluded.push(url);
                }
            }
        }
    }

    let mut seen: HashSet<String> = HashSet::new();
    for anchor in document.select(&anchor_selector) {
        if excluded_nodes.contains(&anchor.id()) {
            continue;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(url) = normalizer.normalize(href, page_url) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        outcome.links.push(ExtractedLink {
            context: context_of(anchor),
            url,
        });
    }

    outcome
}

/// Anchors covered by a selector match: the element itself when it is an
/// anchor, plus every anchor in its subtree.
fn anchors_within<'a>(
    element: ElementRef<'a>,
    anchor_selector: &Selector,
) -> Vec<ElementRef<'a>> {
    let mut anchors = Vec::new();
    if element.value().name() == "a" && element.value().attr("href").is_some() {
        anchors.push(element);
    }
    anchors.extend(element.select(anchor_selector));
    anchors
}

/// The anchor's immediate parent serialized as HTML, truncated.
fn context_of(anchor: ElementRef<'_>) -> String {
    let html = anchor
        .parent()
        .and_then(ElementRef::wrap)
        .map_or_else(|| anchor.html(), |parent| parent.html());
    truncate_chars(&html, CONTEXT_MAX_CHARS)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str, config: &ScanConfig) -> ExtractionOutcome {
        let normalizer = UrlNormalizer::new();
        extract_links(html, "http://a.test/", config, &normalizer)
    }

    #[test]
    fn anchors_are_normalized_against_the_page() {
        let html = r#"<html><body>
            <p><a href="/x">x</a></p>
            <p><a href="y">y</a></p>
            <p><a href="http://b.test/z#frag">z</a></p>
            <p><a href="mailto:a@b.c">mail</a></p>
        </body></html>"#;
        let outcome = extract(html, &ScanConfig::default());
        let urls: Vec<&str> = outcome.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["http://a.test/x", "http://a.test/y", "http://b.test/z"]
        );
    }

    #[test]
    fn duplicate_hrefs_collapse() {
        let html = r#"<a href="/x">one</a><a href="/x#top">two</a>"#;
        let outcome = extract(html, &ScanConfig::default());
        assert_eq!(outcome.links.len(), 1);
    }

    #[test]
    fn context_is_the_parent_html() {
        let html = r#"<div class="card"><a href="/x">link text</a></div>"#;
        let outcome = extract(html, &ScanConfig::default());
        assert!(outcome.links[0].context.contains("class=\"card\""));
        assert!(outcome.links[0].context.contains("link text"));
    }

    #[test]
    fn context_is_bounded() {
        let filler = "y".repeat(2000);
        let html = format!(r#"<div><a href="/x">text</a><span>{filler}</span></div>"#);
        let outcome = extract(&html, &ScanConfig::default());
        assert!(outcome.links[0].context.chars().count() <= CONTEXT_MAX_CHARS);
    }

    #[test]
    fn selector_excluded_links_are_separated() {
        let html = r#"
            <nav class="footer"><a href="/legal">legal</a></nav>
            <main><a href="/content">content</a></main>
        "#;
        let config = ScanConfig {
            css_selectors: vec![".footer".to_string()],
            ..Default::default()
        };
        let outcome = extract(html, &config);
        assert_eq!(outcome.selector_excluded, vec!["http://a.test/legal"]);
        let urls: Vec<&str> = outcome.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["http://a.test/content"]);
    }

    #[test]
    fn selector_matching_an_anchor_directly() {
        let html = r#"<a class="ad" href="/sponsored">ad</a><a href="/real">real</a>"#;
        let config = ScanConfig {
            css_selectors: vec!["a.ad".to_string()],
            ..Default::default()
        };
        let outcome = extract(html, &config);
        assert_eq!(outcome.selector_excluded, vec!["http://a.test/sponsored"]);
        assert_eq!(outcome.links.len(), 1);
        assert_eq!(outcome.links[0].url, "http://a.test/real");
    }

    #[test]
    fn invalid_selectors_are_ignored() {
        let html = r#"<a href="/x">x</a>"#;
        let config = ScanConfig {
            css_selectors: vec![":::garbage".to_string()],
            ..Default::default()
        };
        let outcome = extract(html, &config);
        assert_eq!(outcome.links.len(), 1);
        assert!(outcome.selector_excluded.is_empty());
    }

    #[test]
    fn same_url_inside_and_outside_exclusion_is_still_followed() {
        let html = r#"
            <nav class="menu"><a href="/dual">menu</a></nav>
            <main><a href="/dual">body</a></main>
        "#;
        let config = ScanConfig {
            css_selectors: vec![".menu".to_string()],
            ..Default::default()
        };
        let outcome = extract(html, &config);
        assert_eq!(outcome.selector_excluded, vec!["http://a.test/dual"]);
        assert_eq!(outcome.links.len(), 1);
        assert_eq!(outcome.links[0].url, "http://a.test/dual");
    }
}
