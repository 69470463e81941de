//! Lock-free operational counters.

use std::sync::atomic::{AtomicU64, Ordering};

use codetop_domain::MetricsResponse;

/// Process-wide counters, updated with relaxed atomics on hot paths.
#[derive(Debug, Default)]
pub struct Metrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    chain_selections: AtomicU64,
    provider_fallbacks: AtomicU64,
    scheduler_fallbacks: AtomicU64,
    corrupt_card_recoveries: AtomicU64,
    admission_timeouts: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chain_selection(&self) {
        self.chain_selections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_fallback(&self) {
        self.provider_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scheduler_fallback(&self) {
        self.scheduler_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_corrupt_card_recovery(&self) {
        self.corrupt_card_recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admission_timeout(&self) {
        self.admission_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsResponse {
        MetricsResponse {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            chain_selections: self.chain_selections.load(Ordering::Relaxed),
            provider_fallbacks: self.provider_fallbacks.load(Ordering::Relaxed),
            scheduler_fallbacks: self.scheduler_fallbacks.load(Ordering::Relaxed),
            corrupt_card_recoveries: self.corrupt_card_recoveries.load(Ordering::Relaxed),
            admission_timeouts: self.admission_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_scheduler_fallback();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 2);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.scheduler_fallbacks, 1);
        assert_eq!(snapshot.provider_fallbacks, 0);
    }
}
