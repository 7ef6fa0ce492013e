//! Configuration for the pricing pipeline.
//!
//! Loaded once via figment (defaults → `config.toml` → `APP_`-prefixed env
//! vars) and handed to every component as a read-only `Arc<Config>`. Durations
//! accept either a bare integer (seconds) or a fundu duration string
//! ("500ms", "2m") via the same custom deserializer across every field.

use figment::value::UncasedStr;
use figment::{Figment, providers::Env};
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::time::Duration;

/// Top-level configuration, merged from defaults/file/env.
#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    /// Log level for this crate's own target (e.g. "debug" → "warn,claimpricer=debug,...").
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Port for the HTTP server.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database connection URL.
    pub database_url: String,
    /// Max Postgres pool connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Graceful shutdown timeout.
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,

    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration: defaults → `config.toml` (if present) → env vars,
    /// with Railway's drain-grace env var remapped onto `shutdown_timeout`.
    pub fn load() -> anyhow::Result<Self> {
        Figment::new()
            .merge(Env::raw().map(|k| {
                if k == UncasedStr::new("RAILWAY_DEPLOYMENT_DRAINING_SECONDS") {
                    "SHUTDOWN_TIMEOUT".into()
                } else {
                    k.into()
                }
            }))
            .extract()
            .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> u32 {
    10
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

/// Bounds for the adaptive ingester (C2).
#[derive(Deserialize, Clone, Debug)]
pub struct IngestConfig {
    #[serde(default = "default_min_rows")]
    pub min_rows: usize,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,
    #[serde(
        default = "default_db_p50",
        deserialize_with = "deserialize_duration"
    )]
    pub db_p50_ms: Duration,
    #[serde(
        default = "default_db_p95",
        deserialize_with = "deserialize_duration"
    )]
    pub db_p95_ms: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_rows: default_min_rows(),
            max_rows: default_max_rows(),
            max_batch_bytes: default_max_batch_bytes(),
            db_p50_ms: default_db_p50(),
            db_p95_ms: default_db_p95(),
        }
    }
}

fn default_min_rows() -> usize {
    25
}
fn default_max_rows() -> usize {
    2000
}
fn default_max_batch_bytes() -> usize {
    1_000_000
}
fn default_db_p50() -> Duration {
    Duration::from_millis(50)
}
fn default_db_p95() -> Duration {
    Duration::from_millis(250)
}

/// Bounds for the time-sliced worker (C4) and its retry policy (C6).
#[derive(Deserialize, Clone, Debug)]
pub struct WorkerConfig {
    #[serde(
        default = "default_target_slice_ms",
        deserialize_with = "deserialize_duration"
    )]
    pub target_slice_ms: Duration,
    #[serde(default = "default_claim_min")]
    pub claim_min: usize,
    #[serde(default = "default_claim_max")]
    pub claim_max: usize,
    #[serde(default = "default_safety_factor")]
    pub safety_factor: f64,
    #[serde(
        default = "default_lock_floor_ms",
        deserialize_with = "deserialize_duration"
    )]
    pub lock_floor_ms: Duration,
    #[serde(
        default = "default_lock_cap_ms",
        deserialize_with = "deserialize_duration"
    )]
    pub lock_cap_ms: Duration,
    #[serde(default = "default_max_attempts_error")]
    pub max_attempts_error: i32,
    #[serde(default = "default_max_attempts_not_found")]
    pub max_attempts_not_found: i32,
    #[serde(
        default = "default_heartbeat_interval_ms",
        deserialize_with = "deserialize_duration"
    )]
    pub heartbeat_interval_ms: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            target_slice_ms: default_target_slice_ms(),
            claim_min: default_claim_min(),
            claim_max: default_claim_max(),
            safety_factor: default_safety_factor(),
            lock_floor_ms: default_lock_floor_ms(),
            lock_cap_ms: default_lock_cap_ms(),
            max_attempts_error: default_max_attempts_error(),
            max_attempts_not_found: default_max_attempts_not_found(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

fn default_target_slice_ms() -> Duration {
    Duration::from_secs(5)
}
fn default_claim_min() -> usize {
    5
}
fn default_claim_max() -> usize {
    200
}
fn default_safety_factor() -> f64 {
    0.7
}
fn default_lock_floor_ms() -> Duration {
    Duration::from_millis(2_000)
}
fn default_lock_cap_ms() -> Duration {
    Duration::from_secs(60)
}
fn default_max_attempts_error() -> i32 {
    5
}
fn default_max_attempts_not_found() -> i32 {
    2
}
fn default_heartbeat_interval_ms() -> Duration {
    Duration::from_secs(10)
}

/// Per-provider bounds for search-provider adapters (C9), consumed by the
/// retry/backpressure controller (C6).
#[derive(Deserialize, Clone, Debug)]
pub struct ProviderConfig {
    #[serde(
        default = "default_timeout_fast",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout_fast_ms: Duration,
    #[serde(
        default = "default_timeout_medium",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout_medium_ms: Duration,
    #[serde(
        default = "default_timeout_slow",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout_slow_ms: Duration,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(
        default = "default_min_delay_ms",
        deserialize_with = "deserialize_duration"
    )]
    pub min_delay_ms: Duration,
    /// Endpoint the reference [`crate::adapters::HttpSearchProvider`] queries.
    /// A real deployment swaps this adapter out for a retailer-specific one.
    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_fast_ms: default_timeout_fast(),
            timeout_medium_ms: default_timeout_medium(),
            timeout_slow_ms: default_timeout_slow(),
            max_concurrency: default_max_concurrency(),
            min_delay_ms: default_min_delay_ms(),
            search_endpoint: default_search_endpoint(),
        }
    }
}

fn default_timeout_fast() -> Duration {
    Duration::from_millis(800)
}
fn default_timeout_medium() -> Duration {
    Duration::from_millis(2_000)
}
fn default_timeout_slow() -> Duration {
    Duration::from_millis(5_000)
}
fn default_max_concurrency() -> u32 {
    8
}
fn default_min_delay_ms() -> Duration {
    Duration::from_millis(100)
}
fn default_search_endpoint() -> String {
    "http://localhost:9999/search".to_string()
}

/// Source-policy deny-lists and per-retailer direct-URL patterns (C5).
#[derive(Deserialize, Clone, Debug, Default)]
pub struct PolicyConfig {
    #[serde(default)]
    pub untrusted_sources: Vec<String>,
    #[serde(default)]
    pub untrusted_hosts: Vec<String>,
    #[serde(default)]
    pub direct_url_patterns: HashMap<String, String>,
}

/// Seeds the in-memory principal store (C13) at startup. There is no sign-up
/// flow; operators provision bearer tokens out of band and list them here.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: HashMap<String, PrincipalConfig>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PrincipalConfig {
    pub owner_id: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Duration parser shared by every duration-shaped field above.
const DURATION_PARSER: DurationParser<'static> = DurationParser::builder()
    .time_units(&[TimeUnit::Second, TimeUnit::MilliSecond, TimeUnit::Minute])
    .parse_multiple(None)
    .allow_time_unit_delimiter()
    .disable_infinity()
    .disable_fraction()
    .disable_exponent()
    .default_unit(TimeUnit::Second)
    .build();

/// Accepts a bare integer (seconds) or a duration string ("500ms", "2m").
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Visitor;

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a duration string or number")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            DURATION_PARSER
                .parse(value)
                .map_err(|e| {
                    serde::de::Error::custom(format!(
                        "invalid duration '{}': {}. Examples: '5' (5 seconds), '500ms', '30s', '2m'",
                        value, e
                    ))
                })?
                .try_into()
                .map_err(|e| serde::de::Error::custom(format!("duration conversion error: {}", e)))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value < 0 {
                return Err(serde::de::Error::custom("duration cannot be negative"));
            }
            Ok(Duration::from_secs(value as u64))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}
