//! Candidate scoring (§4.5 state 4): how well a [`SearchCandidate`] matches
//! the [`NormalizedItem`] it was searched for.

use std::collections::HashSet;

use crate::adapters::SearchCandidate;
use crate::domain::model::NormalizedItem;

/// A candidate below this score is not a match, regardless of source.
pub const MATCH_THRESHOLD: f64 = 0.45;

const TITLE_WEIGHT: f64 = 0.55;
const BRAND_MODEL_WEIGHT: f64 = 0.25;
const ATTRIBUTE_WEIGHT: f64 = 0.1;
const DIRECT_URL_WEIGHT: f64 = 0.1;

/// Weighted sum of title token overlap, brand/model mention, attribute
/// overlap, and a flat bonus for a direct (non-search-result) URL. Always in
/// `[0.0, 1.0]`.
pub fn score(item: &NormalizedItem, candidate: &SearchCandidate, is_direct_url: bool) -> f64 {
    let title_score = jaccard(&tokens(&item.title), &tokens(&candidate.title));
    let brand_model_score = brand_model_bonus(item, candidate);
    let attribute_score = attribute_overlap(item, candidate);
    let direct_bonus = if is_direct_url { 1.0 } else { 0.0 };

    TITLE_WEIGHT * title_score
        + BRAND_MODEL_WEIGHT * brand_model_score
        + ATTRIBUTE_WEIGHT * attribute_score
        + DIRECT_URL_WEIGHT * direct_bonus
}

fn tokens(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

fn brand_model_bonus(item: &NormalizedItem, candidate: &SearchCandidate) -> f64 {
    let candidate_title = candidate.title.to_lowercase();
    let mut hits = 0;
    let mut total = 0;

    if let Some(brand) = &item.brand {
        total += 1;
        if candidate_title.contains(brand.as_str()) {
            hits += 1;
        }
    }
    if let Some(model) = &item.model {
        total += 1;
        if candidate_title.contains(&model.to_lowercase()) {
            hits += 1;
        }
    }

    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

fn attribute_overlap(item: &NormalizedItem, candidate: &SearchCandidate) -> f64 {
    if item.attributes.is_empty() {
        return 0.0;
    }
    let candidate_title = candidate.title.to_lowercase();
    let hits = item
        .attributes
        .iter()
        .filter(|attr| candidate_title.contains(&attr.to_lowercase()))
        .count();
    hits as f64 / item.attributes.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> NormalizedItem {
        NormalizedItem {
            title: "55in 4K Smart TV".to_string(),
            brand: Some("samsung".to_string()),
            model: Some("qn55".to_string()),
            category: Some("electronics".to_string()),
            attributes: vec!["black".to_string()],
            keywords: vec![],
            condition: None,
            estimated_price: None,
            extras: Default::default(),
        }
    }

    fn candidate(title: &str) -> SearchCandidate {
        SearchCandidate {
            title: title.to_string(),
            price: Some(499.0),
            currency: "USD".to_string(),
            source_host: "retailer.example".to_string(),
            source_name: "Retailer".to_string(),
            url: "https://retailer.example/dp/X".to_string(),
            raw_json: serde_json::json!({}),
        }
    }

    #[test]
    fn exact_title_and_brand_scores_near_one() {
        let s = score(
            &item(),
            &candidate("Samsung QN55 55in 4K Smart TV Black"),
            true,
        );
        assert!(s > 0.9, "expected near-perfect score, got {s}");
    }

    #[test]
    fn unrelated_candidate_scores_low() {
        let s = score(&item(), &candidate("Garden Hose 50ft"), false);
        assert!(s < MATCH_THRESHOLD);
    }

    #[test]
    fn direct_url_adds_a_flat_bonus() {
        let without = score(&item(), &candidate("4K Smart TV"), false);
        let with = score(&item(), &candidate("4K Smart TV"), true);
        assert!(with > without);
        assert!((with - without - DIRECT_URL_WEIGHT).abs() < 1e-9);
    }
}
