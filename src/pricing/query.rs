//! Ordered query construction (§4.5 state 2).
//!
//! Queries run narrowest-first so a confident match returns after as few
//! provider calls as possible. On a NOT_FOUND retry, the caller skips the
//! narrowest `attempt_floor` queries — the ones already tried and already
//! too specific — so each retry round searches strictly broader ground than
//! the last, instead of repeating an identical miss.

use crate::domain::model::NormalizedItem;

/// Build the full, narrowest-first query list for `item`.
fn all_queries(item: &NormalizedItem) -> Vec<String> {
    let mut queries = Vec::new();

    if let (Some(brand), Some(model)) = (&item.brand, &item.model) {
        queries.push(format!("{brand} {model} {}", item.title));
    }
    if let Some(brand) = &item.brand {
        queries.push(format!("{brand} {}", item.title));
    }
    if let (Some(brand), Some(category)) = (&item.brand, &item.category) {
        queries.push(format!("{brand} {category}"));
    }
    queries.push(item.title.clone());
    if !item.keywords.is_empty() {
        queries.push(item.keywords.join(" "));
    }

    queries.retain(|q| !q.trim().is_empty());
    dedup_preserve_order(queries)
}

fn dedup_preserve_order(queries: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    queries
        .into_iter()
        .filter(|q| seen.insert(q.to_lowercase()))
        .collect()
}

/// The queries worth trying for this attempt, skipping the narrowest
/// `attempt_floor` entries of the full list. Always leaves at least the
/// broadest (last) query, even if `attempt_floor` would otherwise skip past
/// the end of the list.
pub fn build_queries(item: &NormalizedItem, attempt_floor: usize) -> Vec<String> {
    let queries = all_queries(item);
    if queries.is_empty() {
        return queries;
    }
    let skip = attempt_floor.min(queries.len() - 1);
    queries.into_iter().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> NormalizedItem {
        NormalizedItem {
            title: "55in 4K TV".to_string(),
            brand: Some("samsung".to_string()),
            model: Some("QN55".to_string()),
            category: Some("electronics".to_string()),
            attributes: vec![],
            keywords: vec!["4k".to_string(), "tv".to_string()],
            condition: None,
            estimated_price: None,
            extras: Default::default(),
        }
    }

    #[test]
    fn first_attempt_starts_narrowest() {
        let queries = build_queries(&item(), 0);
        assert_eq!(queries[0], "samsung QN55 55in 4K TV");
    }

    #[test]
    fn retry_skips_narrowest_queries() {
        let full = build_queries(&item(), 0);
        let retried = build_queries(&item(), 1);
        assert_eq!(retried, full[1..]);
    }

    #[test]
    fn retry_past_the_end_still_returns_broadest_query() {
        let queries = build_queries(&item(), 100);
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0], item().keywords.join(" "));
    }

    #[test]
    fn no_brand_skips_brand_queries() {
        let mut bare = item();
        bare.brand = None;
        bare.model = None;
        let queries = build_queries(&bare, 0);
        assert_eq!(queries[0], bare.title);
    }
}
