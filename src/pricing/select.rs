//! Selection and labeling (§4.5 states 4-5): pick the winning candidate out
//! of everything scored across every query/provider attempt, and assign the
//! [`MatchQuality`] that export and the UI rely on.
//!
//! Ranking is rank-then-price: a direct product-page candidate always beats
//! a catalog/search-result candidate regardless of price, since a direct URL
//! is the original's strongest trust signal (§9); within a rank bucket the
//! lowest price wins, since the job exists to find the cheapest defensible
//! replacement cost.

use std::cmp::Ordering;

use crate::adapters::SearchCandidate;
use crate::domain::model::MatchQuality;
use crate::pricing::score::MATCH_THRESHOLD;

/// One candidate plus everything needed to rank and label it.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: SearchCandidate,
    pub score: f64,
    pub is_direct_url: bool,
    pub is_untrusted: bool,
}

/// Pick the best candidate across every scored attempt. Untrusted-source and
/// sub-threshold candidates are never eligible. Returns `None` if nothing
/// qualifies, the caller's cue to fall through to the baseline estimate or a
/// NOT_FOUND label.
pub fn select(candidates: Vec<ScoredCandidate>) -> Option<ScoredCandidate> {
    let mut eligible: Vec<ScoredCandidate> = candidates
        .into_iter()
        .filter(|c| !c.is_untrusted && c.score >= MATCH_THRESHOLD)
        .collect();

    eligible.sort_by(|a, b| rank(b).cmp(&rank(a)).then_with(|| compare_price(a, b)));

    eligible.into_iter().next()
}

fn rank(c: &ScoredCandidate) -> u8 {
    if c.is_direct_url { 1 } else { 0 }
}

fn compare_price(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    match (a.candidate.price, b.candidate.price) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// A direct product page is `Verified`; a qualifying catalog/search-result
/// candidate is `Trusted`. Baseline estimates and NOT_FOUND are labeled by
/// the caller, which never goes through this function.
pub fn match_quality(selected: &ScoredCandidate) -> MatchQuality {
    if selected.is_direct_url {
        MatchQuality::Verified
    } else {
        MatchQuality::Trusted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(price: Option<f64>, url: &str) -> SearchCandidate {
        SearchCandidate {
            title: "Thing".to_string(),
            price,
            currency: "USD".to_string(),
            source_host: "retailer.example".to_string(),
            source_name: "Retailer".to_string(),
            url: url.to_string(),
            raw_json: serde_json::json!({}),
        }
    }

    #[test]
    fn direct_url_outranks_cheaper_catalog_candidate() {
        let direct = ScoredCandidate {
            candidate: candidate(Some(100.0), "https://retailer.example/dp/X"),
            score: 0.9,
            is_direct_url: true,
            is_untrusted: false,
        };
        let cheaper_catalog = ScoredCandidate {
            candidate: candidate(Some(10.0), "https://other.example/s?q=thing"),
            score: 0.9,
            is_direct_url: false,
            is_untrusted: false,
        };
        let winner = select(vec![cheaper_catalog, direct]).unwrap();
        assert!(winner.is_direct_url);
        assert_eq!(winner.candidate.price, Some(100.0));
    }

    #[test]
    fn lowest_price_wins_within_a_rank_bucket() {
        let a = ScoredCandidate {
            candidate: candidate(Some(50.0), "https://a.example/s"),
            score: 0.9,
            is_direct_url: false,
            is_untrusted: false,
        };
        let b = ScoredCandidate {
            candidate: candidate(Some(20.0), "https://b.example/s"),
            score: 0.9,
            is_direct_url: false,
            is_untrusted: false,
        };
        let winner = select(vec![a, b]).unwrap();
        assert_eq!(winner.candidate.price, Some(20.0));
    }

    #[test]
    fn untrusted_source_is_never_selected() {
        let only = ScoredCandidate {
            candidate: candidate(Some(20.0), "https://sketchy.example/dp/X"),
            score: 0.95,
            is_direct_url: true,
            is_untrusted: true,
        };
        assert!(select(vec![only]).is_none());
    }

    #[test]
    fn below_threshold_candidate_is_never_selected() {
        let only = ScoredCandidate {
            candidate: candidate(Some(20.0), "https://retailer.example/s"),
            score: MATCH_THRESHOLD - 0.01,
            is_direct_url: false,
            is_untrusted: false,
        };
        assert!(select(vec![only]).is_none());
    }
}
