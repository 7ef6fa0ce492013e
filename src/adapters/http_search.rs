//! Reference HTTP-backed [`SearchProvider`].
//!
//! Issues a GET request against a configurable search endpoint and expects a
//! JSON array of candidates back. Not a production-grade integration with any
//! particular retailer API — it exists to exercise C5's scoring/selection
//! logic against a real wire shape.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{SearchCandidate, SearchProvider, SearchProviderError, SearchResponse};

#[derive(Debug, Deserialize)]
struct RawCandidate {
    title: String,
    price: Option<f64>,
    #[serde(default = "default_currency")]
    currency: String,
    #[serde(default)]
    source_name: Option<String>,
    url: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// A [`SearchProvider`] backed by a single HTTP JSON endpoint.
pub struct HttpSearchProvider {
    name: &'static str,
    endpoint: String,
    client: Client,
}

impl HttpSearchProvider {
    pub fn new(name: &'static str, endpoint: String) -> Self {
        let client = Client::builder()
            .user_agent(concat!("claimpricer/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client builder with static config never fails");

        Self {
            name,
            endpoint,
            client,
        }
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        deadline: Instant,
    ) -> Result<SearchResponse, SearchProviderError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        if timeout.is_zero() {
            return Err(SearchProviderError::Timeout);
        }

        let started = Instant::now();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("limit", &max_results.to_string())])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchProviderError::Timeout
                } else {
                    SearchProviderError::Upstream5xx
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchProviderError::RateLimited);
        }
        if status.is_server_error() {
            return Err(SearchProviderError::Upstream5xx);
        }
        if status.is_client_error() {
            return Err(SearchProviderError::Upstream4xx);
        }

        let raw: Vec<RawCandidate> = response
            .json()
            .await
            .map_err(|_| SearchProviderError::ParseError)?;

        let candidates = raw
            .into_iter()
            .filter_map(|c| {
                let host = url::Url::parse(&c.url).ok()?.host_str()?.to_string();
                let source_name = c.source_name.unwrap_or_else(|| host.clone());
                Some(SearchCandidate {
                    title: c.title,
                    price: c.price,
                    currency: c.currency,
                    source_host: host,
                    source_name,
                    url: c.url,
                    raw_json: serde_json::Value::Null,
                })
            })
            .collect();

        Ok(SearchResponse {
            candidates,
            raw_latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}
