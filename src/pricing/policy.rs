//! Source-policy predicate and direct-URL detection (§4.5, §9 "deny-by-
//! membership, not allow-list").
//!
//! Untrustedness is the exceptional case: every source is trusted unless it
//! appears in one of the two configured deny sets. This mirrors §9's
//! explicit redesign note away from the original's "catalog of trusted
//! sites" allow-list.

use std::collections::HashMap;

use regex::Regex;

use crate::config::PolicyConfig;

/// Path segments that mark a URL as a search-results or catalog page rather
/// than a single product's direct URL, regardless of any retailer-specific
/// pattern match.
const SEARCH_OR_CATALOG_MARKERS: &[&str] = &["/search", "/s?", "/c/", "/category", "/catalog", "/browse"];

/// `true` if `source_host` or `source_name` is on the configured deny lists.
/// An empty deny list means nothing is untrusted (the default assumption).
pub fn is_untrusted(source_host: &str, source_name: &str, policy: &PolicyConfig) -> bool {
    let host = source_host.trim_start_matches("www.").to_lowercase();
    let name = source_name.to_lowercase();

    policy
        .untrusted_hosts
        .iter()
        .any(|h| h.trim_start_matches("www.").to_lowercase() == host)
        || policy.untrusted_sources.iter().any(|s| s.to_lowercase() == name)
}

/// `true` if `url` looks like a direct per-product retailer page rather than
/// a search-result or catalog listing.
///
/// Prefers a retailer-specific regex from `direct_url_patterns` (keyed by
/// host) when one is configured; otherwise falls back to a generic
/// heuristic: a trailing path segment that looks like an opaque product id,
/// with no search/catalog marker anywhere in the path.
pub fn is_direct_url(url: &str, source_host: &str, patterns: &HashMap<String, String>) -> bool {
    let host = source_host.trim_start_matches("www.").to_lowercase();
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default();

    if let Some(pattern) = patterns.get(&host) {
        if let Ok(re) = Regex::new(pattern) {
            return re.is_match(&path);
        }
    }

    generic_direct_url_heuristic(&path)
}

fn generic_direct_url_heuristic(path: &str) -> bool {
    let lower = path.to_lowercase();
    if SEARCH_OR_CATALOG_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return false;
    }

    let Some(last_segment) = path.trim_end_matches('/').rsplit('/').next() else {
        return false;
    };

    if last_segment.is_empty() {
        return false;
    }

    let digit_count = last_segment.chars().filter(|c| c.is_ascii_digit()).count();
    let alnum_len = last_segment.chars().filter(|c| c.is_ascii_alphanumeric()).count();

    // A bare numeric id of reasonable length, or a longer opaque
    // alphanumeric token, both read as a single product page rather than a
    // slug-only listing page.
    (digit_count >= 5 && digit_count == last_segment.len()) || alnum_len >= 8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PolicyConfig {
        PolicyConfig {
            untrusted_sources: vec!["SketchyDeals".to_string()],
            untrusted_hosts: vec!["www.sketchy-deals.example".to_string()],
            direct_url_patterns: HashMap::from([(
                "retailer.example".to_string(),
                r"/dp/[A-Z0-9]{8,}".to_string(),
            )]),
        }
    }

    #[test]
    fn untrusted_by_host_is_case_and_www_insensitive() {
        let p = policy();
        assert!(is_untrusted("sketchy-deals.example", "whatever", &p));
    }

    #[test]
    fn untrusted_by_source_name() {
        let p = policy();
        assert!(is_untrusted("unrelated.example", "sketchydeals", &p));
    }

    #[test]
    fn trusted_by_default() {
        let p = policy();
        assert!(!is_untrusted("retailer.example", "Retailer", &p));
    }

    #[test]
    fn retailer_pattern_matches_direct_product_path() {
        let p = policy();
        assert!(is_direct_url(
            "https://retailer.example/dp/B08N5WRWNW",
            "retailer.example",
            &p.direct_url_patterns
        ));
    }

    #[test]
    fn retailer_pattern_rejects_search_path() {
        let p = policy();
        assert!(!is_direct_url(
            "https://retailer.example/s?k=thermos",
            "retailer.example",
            &p.direct_url_patterns
        ));
    }

    #[test]
    fn generic_heuristic_accepts_long_numeric_id() {
        assert!(is_direct_url(
            "https://other.example/products/123456",
            "other.example",
            &HashMap::new()
        ));
    }

    #[test]
    fn generic_heuristic_rejects_catalog_path() {
        assert!(!is_direct_url(
            "https://other.example/catalog/thermoses",
            "other.example",
            &HashMap::new()
        ));
    }

    #[test]
    fn generic_heuristic_rejects_bare_slug() {
        assert!(!is_direct_url(
            "https://other.example/products/thermos",
            "other.example",
            &HashMap::new()
        ));
    }
}
