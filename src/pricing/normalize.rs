//! Normalization (§4.5 state 1): turn a `CSV`/`SINGLE` item's raw
//! `input_json` row into a [`NormalizedItem`], and clean up whatever a
//! [`DescriptorExtractor`](crate::adapters::DescriptorExtractor) produced for
//! an `IMAGE` item the same way.

use crate::domain::model::NormalizedItem;

/// Common misspellings/aliases seen in submitted rows, corrected before any
/// query is built so a typo doesn't cost a search miss.
const BRAND_CORRECTIONS: &[(&str, &str)] = &[
    ("samung", "samsung"),
    ("samsng", "samsung"),
    ("kitchenaide", "kitchenaid"),
    ("delonghi", "de'longhi"),
    ("black and decker", "black+decker"),
    ("black & decker", "black+decker"),
    ("hewlett packard", "hp"),
];

/// Build a [`NormalizedItem`] from a `CSV`/`SINGLE` row's raw `input_json`.
/// Missing optional fields are left `None`/empty rather than rejected; a row
/// needs only a title to be worth searching for.
pub fn from_input_json(input: &serde_json::Value) -> NormalizedItem {
    let title = input
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();

    let mut item = NormalizedItem {
        title,
        brand: string_field(input, "brand"),
        model: string_field(input, "model").or_else(|| string_field(input, "sku")),
        category: string_field(input, "category"),
        attributes: string_array_field(input, "attributes"),
        keywords: Vec::new(),
        condition: string_field(input, "condition"),
        estimated_price: input.get("estimated_price").and_then(|v| v.as_f64()),
        extras: input.as_object().cloned().unwrap_or_default(),
    };

    apply_corrections(&mut item);
    item
}

/// Lowercase and typo-correct the brand, and (re)derive keywords from the
/// title. Applied after both JSON-row extraction and descriptor extraction
/// so the two `NormalizedItem` sources feed the rest of the pipeline
/// identically.
pub fn apply_corrections(item: &mut NormalizedItem) {
    if let Some(brand) = item.brand.take() {
        let trimmed = brand.trim();
        item.brand = if trimmed.is_empty() {
            None
        } else {
            Some(correct_brand(trimmed))
        };
    }

    if item.keywords.is_empty() {
        item.keywords = derive_keywords(&item.title);
    }
}

fn correct_brand(raw: &str) -> String {
    let lower = raw.to_lowercase();
    BRAND_CORRECTIONS
        .iter()
        .find(|(typo, _)| *typo == lower)
        .map(|(_, correct)| correct.to_string())
        .unwrap_or(lower)
}

/// Lowercased, deduplicated, stopword-free tokens from `title`, used as the
/// last-resort query and as a scoring signal.
fn derive_keywords(title: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &["the", "a", "an", "with", "for", "and", "of", "in"];

    let mut seen = std::collections::HashSet::new();
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

fn string_field(input: &serde_json::Value, key: &str) -> Option<String> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_array_field(input: &serde_json::Value, key: &str) -> Vec<String> {
    input
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_core_fields_from_a_row() {
        let input = json!({
            "title": "Samung 55in 4K TV",
            "brand": "Samung",
            "category": "electronics",
        });
        let item = from_input_json(&input);
        assert_eq!(item.title, "Samung 55in 4K TV");
        assert_eq!(item.brand.as_deref(), Some("samsung"));
        assert_eq!(item.category.as_deref(), Some("electronics"));
    }

    #[test]
    fn empty_brand_is_treated_as_absent() {
        let input = json!({"title": "Thermos", "brand": "   "});
        let item = from_input_json(&input);
        assert_eq!(item.brand, None);
    }

    #[test]
    fn keywords_drop_stopwords_and_dedupe() {
        let keywords = derive_keywords("The Big and the Bigger Box");
        assert_eq!(keywords, vec!["big", "bigger", "box"]);
    }

    #[test]
    fn model_falls_back_to_sku() {
        let input = json!({"title": "Widget", "sku": "WX-200"});
        let item = from_input_json(&input);
        assert_eq!(item.model.as_deref(), Some("WX-200"));
    }
}
