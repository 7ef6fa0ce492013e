//! Per-slice claim-size and lock-TTL computation (C4).

use std::time::Duration;

use crate::config::WorkerConfig;

const EWMA_ALPHA: f64 = 0.3;

/// Tracks a worker-local EWMA of per-item processing time, used to size the
/// next claim and the adaptive lock TTL. One instance per `kickoff` call —
/// there is no cross-slice memory, each slice starts cold.
#[derive(Debug, Clone, Default)]
pub struct ItemTimer {
    avg_item_ms: f64,
}

impl ItemTimer {
    pub fn new() -> Self {
        Self { avg_item_ms: 0.0 }
    }

    pub fn record(&mut self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.avg_item_ms = if self.avg_item_ms == 0.0 {
            sample
        } else {
            EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * self.avg_item_ms
        };
    }

    pub fn avg_item_ms(&self) -> f64 {
        self.avg_item_ms
    }

    /// `clamp((T / avg_item_ms) * safety_factor, claim_min, claim_max)`.
    /// Before any item has completed this slice there is no estimate yet, so
    /// the claim starts at `claim_min`.
    pub fn claim_size(&self, config: &WorkerConfig) -> usize {
        if self.avg_item_ms <= 0.0 {
            return config.claim_min;
        }
        let target_ms = config.target_slice_ms.as_secs_f64() * 1000.0;
        let raw = (target_ms / self.avg_item_ms) * config.safety_factor;
        (raw.round() as usize).clamp(config.claim_min, config.claim_max)
    }

    /// `max(2 * avg_item_ms, lock_floor_ms)`, capped at `lock_cap_ms`.
    pub fn lock_ttl(&self, config: &WorkerConfig) -> Duration {
        let doubled = Duration::from_secs_f64((self.avg_item_ms * 2.0 / 1000.0).max(0.0));
        doubled.max(config.lock_floor_ms).min(config.lock_cap_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> WorkerConfig {
        WorkerConfig {
            target_slice_ms: Duration::from_secs(5),
            claim_min: 5,
            claim_max: 200,
            safety_factor: 0.7,
            lock_floor_ms: Duration::from_millis(2_000),
            lock_cap_ms: Duration::from_secs(60),
            max_attempts_error: 5,
            max_attempts_not_found: 2,
            heartbeat_interval_ms: Duration::from_secs(10),
        }
    }

    #[test]
    fn cold_timer_claims_the_floor() {
        let timer = ItemTimer::new();
        assert_eq!(timer.claim_size(&make_config()), 5);
    }

    #[test]
    fn claim_size_scales_with_slice_budget() {
        let mut timer = ItemTimer::new();
        timer.record(Duration::from_millis(100));
        // 5000ms / 100ms * 0.7 = 35
        assert_eq!(timer.claim_size(&make_config()), 35);
    }

    #[test]
    fn claim_size_is_clamped_to_claim_max() {
        let mut timer = ItemTimer::new();
        timer.record(Duration::from_millis(1));
        assert_eq!(timer.claim_size(&make_config()), 200);
    }

    #[test]
    fn claim_size_is_clamped_to_claim_min() {
        let mut timer = ItemTimer::new();
        timer.record(Duration::from_secs(10));
        assert_eq!(timer.claim_size(&make_config()), 5);
    }

    #[test]
    fn lock_ttl_uses_the_floor_for_fast_items() {
        let mut timer = ItemTimer::new();
        timer.record(Duration::from_millis(10));
        assert_eq!(timer.lock_ttl(&make_config()), Duration::from_millis(2_000));
    }

    #[test]
    fn lock_ttl_doubles_slow_items_up_to_the_cap() {
        let mut timer = ItemTimer::new();
        timer.record(Duration::from_secs(40));
        assert_eq!(timer.lock_ttl(&make_config()), Duration::from_secs(60));
    }

    #[test]
    fn ewma_smooths_across_samples() {
        let mut timer = ItemTimer::new();
        timer.record(Duration::from_millis(100));
        timer.record(Duration::from_millis(100));
        timer.record(Duration::from_millis(1000));
        // 0.3*1000 + 0.7*100 = 370
        assert!((timer.avg_item_ms() - 370.0).abs() < 1.0);
    }
}
