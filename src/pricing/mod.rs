//! Price-resolution state machine (C5): normalize → build queries → fan out
//! to the search provider → score & filter → select → label.
//!
//! Every path through [`resolve`] produces a terminal [`JobItemStatus`]; the
//! worker (C4) checkpoints whatever comes back without itself knowing the
//! pricing heuristics. `resolve` only returns `Err` for a failure that isn't
//! a pricing outcome at all (a JSON encoding bug, not a provider miss).

pub mod baseline;
pub mod normalize;
pub mod policy;
pub mod query;
pub mod score;
pub mod select;

use std::time::Instant;

use base64::Engine;
use tracing::{debug, warn};

use crate::adapters::SearchProviderError;
use crate::control::{ErrorDisposition, TimeoutTier};
use crate::db::DbContext;
use crate::domain::model::{
    JobItem, JobItemStatus, JobType, MatchQuality, NormalizedItem, ResultRecord, SearchOutcome,
};
use crate::error::Result;
use crate::pricing::select::ScoredCandidate;
use crate::worker::PricingDeps;

/// Outcome of running one item through the full pipeline.
pub struct Resolution {
    pub status: JobItemStatus,
    pub normalized_json: Option<serde_json::Value>,
    pub result_json: Option<serde_json::Value>,
    pub error: Option<String>,
}

pub async fn resolve(
    ctx: &DbContext,
    deps: &PricingDeps,
    item: &JobItem,
    deadline: Instant,
) -> Result<Resolution> {
    let normalized = match normalize_item(deps, item, deadline).await {
        Ok(n) => n,
        Err(err) => {
            warn!(item_id = item.id, error = %err, "normalization failed");
            return Ok(Resolution {
                status: JobItemStatus::Error,
                normalized_json: None,
                result_json: Some(serde_json::to_value(ResultRecord::none())?),
                error: Some(format!("normalization failed: {err}")),
            });
        }
    };

    if normalized.title.trim().is_empty() {
        return Ok(Resolution {
            status: JobItemStatus::Error,
            normalized_json: Some(serde_json::to_value(&normalized)?),
            result_json: Some(serde_json::to_value(ResultRecord::none())?),
            error: Some("normalization produced an empty title".to_string()),
        });
    }

    let normalized_json = serde_json::to_value(&normalized)?;

    // `item.attempts` counts prior NOT_FOUND/ERROR checkpoint rounds (bumped
    // across reprocess cycles, not within this call); use it as the floor so
    // a reprocessed item starts broader than the queries already exhausted
    // in earlier rounds.
    let attempt_floor = item.attempts.max(0) as usize;
    let queries = query::build_queries(&normalized, attempt_floor);

    let mut scored: Vec<ScoredCandidate> = Vec::new();
    let mut transient_errors = 0i32;
    let mut saw_success = false;

    for q in &queries {
        if Instant::now() >= deadline {
            break;
        }

        let provider_name = deps.search_provider.name();
        let tier = pick_timeout_tier(deadline, deps);
        let call_deadline = std::cmp::min(deadline, Instant::now() + deps.retry.timeout_for_tier(tier));

        deps.retry.throttle(provider_name).await;
        let started_at = chrono::Utc::now();
        let call_start = Instant::now();
        let outcome = deps.search_provider.search(q, 10, call_deadline).await;
        let finished_at = chrono::Utc::now();
        let latency_ms = call_start.elapsed().as_millis() as i32;

        deps.audit_sink
            .emit(
                "provider_queried",
                Some(item.job_id),
                serde_json::json!({
                    "item_id": item.id,
                    "provider": provider_name,
                    "query": q,
                    "ok": outcome.is_ok(),
                }),
            )
            .await;

        match outcome {
            Ok(response) => {
                deps.retry.record_outcome(provider_name, None);
                saw_success = true;

                let result_count = response.candidates.len() as i32;
                let mut chosen_url: Option<String> = None;

                for candidate in &response.candidates {
                    let untrusted = policy::is_untrusted(
                        &candidate.source_host,
                        &candidate.source_name,
                        &deps.policy,
                    );
                    let direct = policy::is_direct_url(
                        &candidate.url,
                        &candidate.source_host,
                        &deps.policy.direct_url_patterns,
                    );
                    let candidate_score = score::score(&normalized, candidate, direct);

                    if chosen_url.is_none() && !untrusted && candidate_score >= score::MATCH_THRESHOLD {
                        chosen_url = Some(candidate.url.clone());
                    }

                    scored.push(ScoredCandidate {
                        candidate: candidate.clone(),
                        score: candidate_score,
                        is_direct_url: direct,
                        is_untrusted: untrusted,
                    });
                }

                ctx.search_events()
                    .record(
                        item.id,
                        provider_name,
                        q,
                        started_at,
                        finished_at,
                        if result_count > 0 { SearchOutcome::Hit } else { SearchOutcome::Miss },
                        latency_ms,
                        None,
                        result_count,
                        chosen_url.as_deref(),
                    )
                    .await?;

                // Stop after the first query that yields a usable candidate
                // from an allowed source (§4.5 state 3).
                if chosen_url.is_some() {
                    break;
                }
            }
            Err(err) => {
                let disposition = ErrorDisposition::from(err);
                deps.retry.record_outcome(provider_name, Some(disposition));

                let (outcome_label, error_kind) = match err {
                    SearchProviderError::Timeout => (SearchOutcome::Timeout, "timeout"),
                    SearchProviderError::RateLimited => (SearchOutcome::Error, "rate_limited"),
                    SearchProviderError::Upstream5xx => (SearchOutcome::Error, "upstream_5xx"),
                    SearchProviderError::Upstream4xx => (SearchOutcome::Error, "upstream_4xx"),
                    SearchProviderError::ParseError => (SearchOutcome::Error, "parse_error"),
                };

                ctx.search_events()
                    .record(
                        item.id,
                        provider_name,
                        q,
                        started_at,
                        finished_at,
                        outcome_label,
                        latency_ms,
                        Some(error_kind),
                        0,
                        None,
                    )
                    .await?;

                if disposition == ErrorDisposition::Transient {
                    transient_errors += 1;
                    if !deps.retry.should_retry_transient(transient_errors, deps.max_attempts_error) {
                        warn!(item_id = item.id, provider_name, "transient error budget exhausted");
                        break;
                    }
                }
                // Permanent: this query phrasing can't be fixed by retrying
                // the same provider, but a broader query is still worth a shot.
            }
        }
    }

    if let Some(winner) = select::select(scored) {
        let result = ResultRecord {
            price: winner.candidate.price,
            currency: winner.candidate.currency.clone(),
            source: winner.candidate.source_host.clone(),
            url: Some(winner.candidate.url.clone()),
            category: normalized.category.clone(),
            subcategory: None,
            match_quality: select::match_quality(&winner),
            is_estimated: false,
        };
        return Ok(Resolution {
            status: JobItemStatus::Done,
            normalized_json: Some(normalized_json),
            result_json: Some(serde_json::to_value(result)?),
            error: None,
        });
    }

    // Every attempt failed transiently and the budget is exhausted: this is
    // an ERROR, not a NOT_FOUND — we never learned whether a match exists.
    if !saw_success
        && transient_errors > 0
        && !deps.retry.should_retry_transient(transient_errors, deps.max_attempts_error)
    {
        return Ok(Resolution {
            status: JobItemStatus::Error,
            normalized_json: Some(normalized_json),
            result_json: Some(serde_json::to_value(ResultRecord::none())?),
            error: Some("all provider calls failed transiently".to_string()),
        });
    }

    // No candidate cleared threshold but a plausible price can still be
    // derived: the item's own submitted estimate, or a category baseline.
    let fallback_price = normalized
        .estimated_price
        .map(|p| (p, "submitted-estimate".to_string()))
        .or_else(|| {
            normalized
                .category
                .as_ref()
                .map(|_| (baseline::estimate(normalized.category.as_deref()), "category-baseline".to_string()))
        });

    if let Some((price, source)) = fallback_price {
        debug!(item_id = item.id, price, source, "falling back to an estimated price");
        let result = ResultRecord {
            price: Some(price),
            currency: "USD".to_string(),
            source,
            url: None,
            category: normalized.category.clone(),
            subcategory: None,
            match_quality: MatchQuality::Estimated,
            is_estimated: true,
        };
        return Ok(Resolution {
            status: JobItemStatus::Done,
            normalized_json: Some(normalized_json),
            result_json: Some(serde_json::to_value(result)?),
            error: None,
        });
    }

    Ok(Resolution {
        status: JobItemStatus::NotFound,
        normalized_json: Some(normalized_json),
        result_json: Some(serde_json::to_value(ResultRecord::none())?),
        error: None,
    })
}

async fn normalize_item(deps: &PricingDeps, item: &JobItem, deadline: Instant) -> Result<NormalizedItem> {
    match item.job_type {
        JobType::Image => {
            let image_bytes = decode_image_bytes(&item.input_json)?;
            let mut described = deps.descriptor_extractor.describe(&image_bytes, deadline).await?;
            normalize::apply_corrections(&mut described);
            Ok(described)
        }
        JobType::Csv | JobType::Single => Ok(normalize::from_input_json(&item.input_json)),
    }
}

fn decode_image_bytes(input: &serde_json::Value) -> Result<Vec<u8>> {
    let encoded = input
        .get("image_base64")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("IMAGE item is missing an image_base64 field"))?;

    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|err| anyhow::anyhow!("invalid base64 image data: {err}"))
}

/// Picks the timing tier for the next provider call from the remaining
/// per-item budget: a call is only given a tier's full timeout if the slice
/// can still afford it, so a query near the deadline degrades to the fast
/// tier rather than risking starving the rest of the slice.
fn pick_timeout_tier(deadline: Instant, deps: &PricingDeps) -> TimeoutTier {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining >= deps.retry.timeout_for_tier(TimeoutTier::Slow) {
        TimeoutTier::Slow
    } else if remaining >= deps.retry.timeout_for_tier(TimeoutTier::Medium) {
        TimeoutTier::Medium
    } else {
        TimeoutTier::Fast
    }
}
