//! Retry/backpressure controller (C6).
//!
//! Observes provider call outcomes over a sliding window and tunes three
//! things: the worker's overall dispatch concurrency, a per-provider request
//! rate (so a throttled provider gets fewer/slower calls without the whole
//! process stalling), and the per-item retry budget consulted by C5. State
//! lives entirely in this struct, instantiated once at process start and
//! handed around by `Arc` — there is no ambient singleton, and a fresh
//! process always starts from configured defaults (§4.6 of the spec this
//! crate implements).

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};

use crate::adapters::SearchProviderError;
use crate::config::{ProviderConfig, WorkerConfig};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// How long an outcome stays in a provider's sliding error-rate window.
const WINDOW: Duration = Duration::from_secs(30);
/// Minimum sample count before the error rate is trusted enough to act on.
const MIN_SAMPLES: usize = 5;
/// Error rate above which a provider's concurrency share is halved.
const ERROR_RATE_THRESHOLD: f64 = 0.5;

struct SlidingWindow {
    outcomes: VecDeque<(Instant, bool)>,
}

impl SlidingWindow {
    fn new() -> Self {
        Self {
            outcomes: VecDeque::new(),
        }
    }

    fn record(&mut self, was_error: bool) {
        let now = Instant::now();
        self.outcomes.push_back((now, was_error));
        while let Some(&(ts, _)) = self.outcomes.front() {
            if now.duration_since(ts) > WINDOW {
                self.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn error_rate(&self) -> Option<f64> {
        if self.outcomes.len() < MIN_SAMPLES {
            return None;
        }
        let errors = self.outcomes.iter().filter(|(_, e)| *e).count();
        Some(errors as f64 / self.outcomes.len() as f64)
    }
}

struct ProviderState {
    limiter: DirectLimiter,
    window: Mutex<SlidingWindow>,
    /// Reusable provider calls are additionally delayed after throttling;
    /// exponential with jitter, reset on the next clean outcome.
    backoff: Mutex<Duration>,
}

impl ProviderState {
    fn new(config: &ProviderConfig) -> Self {
        let period = config.min_delay_ms.max(Duration::from_millis(1));
        let quota = Quota::with_period(period)
            .expect("min_delay_ms is nonzero")
            .allow_burst(NonZeroU32::new(config.max_concurrency.max(1)).unwrap());

        Self {
            limiter: RateLimiter::direct(quota),
            window: Mutex::new(SlidingWindow::new()),
            backoff: Mutex::new(Duration::ZERO),
        }
    }
}

/// Per-call timing tier, selected from the worker's current `avg_item_ms`
/// and used to size a provider call's own deadline (§4.5 state 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutTier {
    Fast,
    Medium,
    Slow,
}

impl TimeoutTier {
    /// Cheap items get the fast/medium budget; a worker that's been running
    /// slow items gets the slow budget, on the theory that a slice already
    /// sized for slow items can afford a slower provider call too.
    pub fn from_avg_item_ms(avg_item_ms: f64) -> Self {
        if avg_item_ms <= 0.0 || avg_item_ms < 300.0 {
            TimeoutTier::Fast
        } else if avg_item_ms < 1_500.0 {
            TimeoutTier::Medium
        } else {
            TimeoutTier::Slow
        }
    }

    pub fn duration(self, config: &ProviderConfig) -> Duration {
        match self {
            TimeoutTier::Fast => config.timeout_fast_ms,
            TimeoutTier::Medium => config.timeout_medium_ms,
            TimeoutTier::Slow => config.timeout_slow_ms,
        }
    }
}

/// Whether a given provider-call error should be retried with another query
/// in the same item dispatch, and whether it counts against the item's
/// lifetime `max_attempts_error` budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Transient: timeout, rate-limited, 5xx. Counts toward the error budget.
    Transient,
    /// Permanent (4xx other than 429): doesn't count toward the budget, but
    /// this particular query is abandoned.
    Permanent,
}

impl From<SearchProviderError> for ErrorDisposition {
    fn from(err: SearchProviderError) -> Self {
        match err {
            SearchProviderError::Timeout
            | SearchProviderError::RateLimited
            | SearchProviderError::Upstream5xx => ErrorDisposition::Transient,
            SearchProviderError::Upstream4xx | SearchProviderError::ParseError => {
                ErrorDisposition::Permanent
            }
        }
    }
}

/// Process-local retry/backpressure state, shared by `Arc` into the worker
/// and every adapter call site.
pub struct RetryController {
    providers: DashMap<&'static str, ProviderState>,
    provider_config: ProviderConfig,
    concurrency: AtomicUsize,
    base_concurrency: usize,
}

impl RetryController {
    pub fn new(provider_config: ProviderConfig, worker_config: &WorkerConfig) -> Self {
        // A sensible process-wide dispatch concurrency: enough to keep the
        // claim-size/slice budget busy without wildly outrunning a single
        // provider's configured capacity.
        let base_concurrency = worker_config.claim_max.min(provider_config.max_concurrency as usize).max(1);
        Self {
            providers: DashMap::new(),
            provider_config,
            concurrency: AtomicUsize::new(base_concurrency),
            base_concurrency,
        }
    }

    fn provider(&self, name: &'static str) -> dashmap::mapref::one::Ref<'_, &'static str, ProviderState> {
        self.providers
            .entry(name)
            .or_insert_with(|| ProviderState::new(&self.provider_config));
        self.providers.get(name).expect("just inserted")
    }

    /// Block until `provider` has a free rate-limit slot, honoring any
    /// additional post-throttle backoff accumulated on the last 429/5xx.
    pub async fn throttle(&self, provider: &'static str) {
        let extra = {
            let state = self.provider(provider);
            *state.backoff.lock().expect("lock poisoned")
        };
        if extra > Duration::ZERO {
            tokio::time::sleep(extra).await;
        }
        self.provider(provider).limiter.until_ready().await;
    }

    /// Record the outcome of one provider call and adjust that provider's
    /// backoff and the process-wide concurrency cap.
    pub fn record_outcome(&self, provider: &'static str, disposition: Option<ErrorDisposition>) {
        let was_error = disposition.is_some();
        let state = self.provider(provider);
        {
            let mut window = state.window.lock().expect("lock poisoned");
            window.record(was_error);
        }

        let mut backoff = state.backoff.lock().expect("lock poisoned");
        match disposition {
            Some(ErrorDisposition::Transient) => {
                let next = if *backoff == Duration::ZERO {
                    self.provider_config.min_delay_ms
                } else {
                    *backoff * 2
                }
                .min(Duration::from_secs(30));
                let jitter_ms = (next.as_millis() as f64 * 0.1 * rand::random::<f64>()) as u64;
                *backoff = next + Duration::from_millis(jitter_ms);
            }
            _ => {
                *backoff = Duration::ZERO;
            }
        }
        drop(backoff);

        self.adjust_concurrency(&state);
    }

    fn adjust_concurrency(&self, state: &ProviderState) {
        let Some(error_rate) = state.window.lock().expect("lock poisoned").error_rate() else {
            return;
        };

        if error_rate >= ERROR_RATE_THRESHOLD {
            let current = self.concurrency.load(Ordering::Relaxed);
            let shrunk = (current / 2).max(1);
            self.concurrency.store(shrunk, Ordering::Relaxed);
        } else if error_rate == 0.0 {
            // Restore slowly: step back up toward the baseline one unit at a time
            // rather than snapping back, so a single clean window doesn't
            // immediately re-expose a still-struggling provider to full load.
            let current = self.concurrency.load(Ordering::Relaxed);
            if current < self.base_concurrency {
                self.concurrency.store(current + 1, Ordering::Relaxed);
            }
        }
    }

    /// Current process-wide dispatch concurrency, consulted by the worker
    /// (C4) once per slice.
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency.load(Ordering::Relaxed)
    }

    /// The configured per-call timeout for `tier`, consulted by C5 when
    /// sizing one provider call's deadline.
    pub fn timeout_for_tier(&self, tier: TimeoutTier) -> Duration {
        tier.duration(&self.provider_config)
    }

    /// Whether an item with `attempts` recorded transient failures so far may
    /// be given another attempt under `max_attempts_error`.
    pub fn should_retry_transient(&self, attempts: i32, max_attempts_error: i32) -> bool {
        attempts < max_attempts_error
    }

    /// Whether an item with `attempts` NOT_FOUND rounds so far may be given
    /// another, broader-query attempt under `max_attempts_not_found`.
    pub fn should_retry_not_found(&self, attempts: i32, max_attempts_not_found: i32) -> bool {
        attempts < max_attempts_not_found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_config() -> ProviderConfig {
        ProviderConfig {
            timeout_fast_ms: Duration::from_millis(800),
            timeout_medium_ms: Duration::from_millis(2_000),
            timeout_slow_ms: Duration::from_millis(5_000),
            max_concurrency: 8,
            min_delay_ms: Duration::from_millis(50),
        }
    }

    fn worker_config() -> WorkerConfig {
        WorkerConfig {
            target_slice_ms: Duration::from_secs(5),
            claim_min: 5,
            claim_max: 50,
            safety_factor: 0.7,
            lock_floor_ms: Duration::from_millis(2_000),
            lock_cap_ms: Duration::from_secs(60),
            max_attempts_error: 5,
            max_attempts_not_found: 2,
            heartbeat_interval_ms: Duration::from_secs(10),
        }
    }

    #[test]
    fn timeout_tier_escalates_with_avg_item_ms() {
        let cfg = provider_config();
        assert_eq!(TimeoutTier::from_avg_item_ms(0.0).duration(&cfg), cfg.timeout_fast_ms);
        assert_eq!(TimeoutTier::from_avg_item_ms(500.0).duration(&cfg), cfg.timeout_medium_ms);
        assert_eq!(TimeoutTier::from_avg_item_ms(5_000.0).duration(&cfg), cfg.timeout_slow_ms);
    }

    #[test]
    fn error_disposition_classifies_transient_vs_permanent() {
        assert_eq!(
            ErrorDisposition::from(SearchProviderError::Timeout),
            ErrorDisposition::Transient
        );
        assert_eq!(
            ErrorDisposition::from(SearchProviderError::RateLimited),
            ErrorDisposition::Transient
        );
        assert_eq!(
            ErrorDisposition::from(SearchProviderError::Upstream4xx),
            ErrorDisposition::Permanent
        );
    }

    #[test]
    fn concurrency_shrinks_on_sustained_errors() {
        let controller = RetryController::new(provider_config(), &worker_config());
        let before = controller.concurrency_limit();
        for _ in 0..MIN_SAMPLES {
            controller.record_outcome("test-provider", Some(ErrorDisposition::Transient));
        }
        assert!(controller.concurrency_limit() < before);
    }

    #[test]
    fn concurrency_restores_slowly_on_clean_outcomes() {
        let controller = RetryController::new(provider_config(), &worker_config());
        for _ in 0..MIN_SAMPLES {
            controller.record_outcome("test-provider", Some(ErrorDisposition::Transient));
        }
        let shrunk = controller.concurrency_limit();
        for _ in 0..MIN_SAMPLES {
            controller.record_outcome("test-provider", None);
        }
        assert!(controller.concurrency_limit() > shrunk);
        assert!(controller.concurrency_limit() <= controller.base_concurrency);
    }

    #[test]
    fn retry_budgets_respect_configured_caps() {
        let controller = RetryController::new(provider_config(), &worker_config());
        assert!(controller.should_retry_transient(4, 5));
        assert!(!controller.should_retry_transient(5, 5));
        assert!(controller.should_retry_not_found(1, 2));
        assert!(!controller.should_retry_not_found(2, 2));
    }
}
