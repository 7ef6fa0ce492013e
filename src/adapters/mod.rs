//! External-adapter ports (C9): narrow traits the core pipeline depends on,
//! with one reference implementation per port. None of the reference
//! implementations is a production-grade integration; they exist to exercise
//! the pipeline end to end.

pub mod csv_parser;
pub mod http_search;
pub mod log_audit_sink;
pub mod stub_descriptor;

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::model::NormalizedItem;
use crate::error::Result;

pub use csv_parser::CsvFileParser;
pub use http_search::HttpSearchProvider;
pub use log_audit_sink::LogAuditSink;
pub use stub_descriptor::StubDescriptorExtractor;

/// One candidate match returned by a [`SearchProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub title: String,
    pub price: Option<f64>,
    pub currency: String,
    pub source_host: String,
    /// Human-readable retailer name as the provider reports it, distinct from
    /// `source_host`; the two deny lists in [`crate::pricing::policy`] check
    /// each against its own configured set.
    pub source_name: String,
    pub url: String,
    pub raw_json: serde_json::Value,
}

/// Outcome of a provider search call.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub candidates: Vec<SearchCandidate>,
    pub raw_latency_ms: u64,
}

/// Error kinds a [`SearchProvider`] can fail with. Distinguishing these lets
/// the retry/backpressure controller (C6) apply a different policy to each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SearchProviderError {
    #[error("provider request timed out")]
    Timeout,
    #[error("provider rate-limited the request")]
    RateLimited,
    #[error("provider returned a 5xx response")]
    Upstream5xx,
    #[error("provider returned a 4xx response")]
    Upstream4xx,
    #[error("provider response could not be parsed")]
    ParseError,
}

/// Resolves a normalized item description into candidate offers.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// A short, stable name used for per-provider rate limiting and logging.
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        deadline: Instant,
    ) -> std::result::Result<SearchResponse, SearchProviderError>;
}

/// Derives a [`NormalizedItem`] from raw image bytes, for `IMAGE` job items.
#[async_trait]
pub trait DescriptorExtractor: Send + Sync {
    async fn describe(&self, image_bytes: &[u8], deadline: Instant) -> Result<NormalizedItem>;
}

/// Streams rows out of an uploaded batch. The iterator is lazy and finite; it
/// is not restartable from the middle, so callers that need resumability
/// re-derive their position from already-persisted `JobItem` rows rather than
/// from the parser.
pub trait FileParser: Send + Sync {
    fn stream_rows(
        &self,
        source_ref: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<serde_json::Value>> + Send>>;
}

/// Fire-and-forget sink for audit events. A failed `emit` must never fail the
/// transaction it describes.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn emit(&self, event_kind: &str, job_id: Option<i64>, payload: serde_json::Value);
}
