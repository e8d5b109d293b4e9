//! URL canonicalization for link checking.
//!
//! Every href discovered on a page passes through here before it touches the
//! result catalog. Canonical form: absolute http(s) URL with the fragment
//! stripped. Non-web schemes are rejected outright.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use log::debug;
use lru::LruCache;
use url::Url;

/// Base URLs repeat heavily within one page, so the fragment-stripped form of
/// recently seen bases is memoized.
const BASE_CACHE_CAPACITY: usize = 1024;

pub struct UrlNormalizer {
    base_cache: Mutex<LruCache<String, Option<String>>>,
}

impl Default for UrlNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlNormalizer {
    #[must_use]
    pub fn new() -> Self {
        let capacity = NonZeroUsize::new(BASE_CACHE_CAPACITY)
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            base_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Canonicalize a raw `href` against `base`.
    ///
    /// Returns `None` for non-HTTP schemes (`mailto:`, `tel:`, `javascript:`,
    /// `data:`, ...) and for hrefs that do not resolve to a valid URL.
    /// Fragment-only hrefs canonicalize to the base with its fragment removed.
    pub fn normalize(&self, href: &str, base: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }

        if let Some(scheme) = leading_scheme(href)
            && scheme != "http"
            && scheme != "https"
        {
            return None;
        }

        if href.starts_with('#') {
            return self.stripped_base(base);
        }

        let base_url = match Url::parse(base) {
            Ok(u) => u,
            Err(e) => {
                debug!("Unparseable base URL {base}: {e}");
                return None;
            }
        };

        match base_url.join(href) {
            Ok(mut resolved) => {
                resolved.set_fragment(None);
                Some(resolved.into())
            }
            Err(e) => {
                debug!("Failed to resolve href {href} against {base}: {e}");
                None
            }
        }
    }

    /// Fragment-stripped form of a base URL, memoized.
    fn stripped_base(&self, base: &str) -> Option<String> {
        if let Ok(mut cache) = self.base_cache.lock()
            && let Some(hit) = cache.get(base)
        {
            return hit.clone();
        }

        let stripped = match Url::parse(base) {
            Ok(mut u) => {
                u.set_fragment(None);
                Some(String::from(u))
            }
            Err(e) => {
                debug!("Unparseable base URL {base}: {e}");
                None
            }
        };

        if let Ok(mut cache) = self.base_cache.lock() {
            cache.put(base.to_string(), stripped.clone());
        }
        stripped
    }
}

/// Extract the scheme prefix of an href, if it has one.
///
/// Matches `^[a-z][a-z0-9+.-]*:` case-insensitively; relative paths and
/// protocol-relative `//host` hrefs have no scheme.
fn leading_scheme(href: &str) -> Option<String> {
    let colon = href.find(':')?;
    let candidate = &href[..colon];
    let mut chars = candidate.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-')) {
        Some(candidate.to_ascii_lowercase())
    } else {
        None
    }
}

/// Lowercased host of a URL with any leading `www.` removed.
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(strip_www(&host).to_string())
}

/// Strip a single leading `www.` label.
#[must_use]
pub fn strip_www(host: &str) -> &str {
    if host.len() > 4 && host.starts_with("www.") {
        &host[4..]
    } else {
        host
    }
}

/// Registered domain of a host: its last two labels.
///
/// `sub.example.com` → `example.com`. Hosts with fewer than two labels
/// (localhost, IPv4 addresses are compared whole) are returned unchanged.
#[must_use]
pub fn registered_domain(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }
    let labels: Vec<&str> = host.rsplitn(3, '.').collect();
    if labels.len() < 3 {
        return host;
    }
    format!("{}.{}", labels[1], labels[0])
}

/// Whether two URLs share a registered domain.
#[must_use]
pub fn same_site(url: &str, other: &str) -> bool {
    match (host_of(url), host_of(other)) {
        (Some(a), Some(b)) => registered_domain(&a) == registered_domain(&b),
        _ => false,
    }
}

/// Whether `host` is a proper subdomain of `seed_host`'s registered domain.
///
/// `sub.example.com` is a proper subdomain of `example.com`; `example.com`
/// and `www.example.com` are not (www is normalized away before the check).
#[must_use]
pub fn is_proper_subdomain(host: &str, seed_host: &str) -> bool {
    let host = strip_www(&host.to_ascii_lowercase()).to_string();
    let base = registered_domain(&seed_host.to_ascii_lowercase());
    host != base && host.ends_with(&format!(".{base}"))
}
