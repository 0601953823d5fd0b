//! Rolling per-provider performance, fed back after every real call.

use super::catalog::{ProviderCatalog, DEFAULT_ESTIMATED_TOKENS};
use crate::clock::{self, Clock};
use crate::types::ProviderId;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Smoothing factor for the moving averages.
pub const EMA_ALPHA: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceRecord {
    pub avg_latency_ms: f64,
    pub success_rate: f64,
    /// Average USD per request.
    pub avg_cost: f64,
    pub samples: u64,
    pub last_used: Option<Instant>,
}

impl PerformanceRecord {
    fn prior(catalog: &ProviderCatalog, provider: ProviderId) -> Self {
        match catalog.profile(provider) {
            Some(p) => Self {
                avg_latency_ms: p.prior_latency.as_secs_f64() * 1000.0,
                success_rate: p.prior_success_rate,
                avg_cost: p.estimate_cost(DEFAULT_ESTIMATED_TOKENS),
                samples: 0,
                last_used: None,
            },
            None => Self {
                avg_latency_ms: 5_000.0,
                success_rate: 0.5,
                avg_cost: 0.0,
                samples: 0,
                last_used: None,
            },
        }
    }
}

fn ema(previous: f64, sample: f64) -> f64 {
    EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * previous
}

/// Concurrent EMA tracker keyed by provider.
pub struct PerformanceTracker {
    records: DashMap<ProviderId, PerformanceRecord>,
    catalog: Arc<ProviderCatalog>,
    clock: Arc<dyn Clock>,
}

impl PerformanceTracker {
    pub fn new(catalog: Arc<ProviderCatalog>) -> Self {
        Self::with_clock(catalog, clock::system())
    }

    pub fn with_clock(catalog: Arc<ProviderCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            catalog,
            clock,
        }
    }

    /// Current record; catalog priors for providers never called.
    pub fn get(&self, provider: ProviderId) -> PerformanceRecord {
        self.records
            .get(&provider)
            .map(|r| r.clone())
            .unwrap_or_else(|| PerformanceRecord::prior(&self.catalog, provider))
    }

    pub fn record_success(&self, provider: ProviderId, latency: Duration, cost: f64) {
        self.update(provider, |r| {
            r.avg_latency_ms = ema(r.avg_latency_ms, latency.as_secs_f64() * 1000.0);
            r.success_rate = ema(r.success_rate, 1.0);
            r.avg_cost = ema(r.avg_cost, cost.max(0.0));
        });
    }

    /// Latency of a failed call still counts; cost is left untouched.
    pub fn record_failure(&self, provider: ProviderId, latency: Duration) {
        self.update(provider, |r| {
            r.avg_latency_ms = ema(r.avg_latency_ms, latency.as_secs_f64() * 1000.0);
            r.success_rate = ema(r.success_rate, 0.0);
        });
    }

    fn update(&self, provider: ProviderId, f: impl FnOnce(&mut PerformanceRecord)) {
        let now = self.clock.now();
        let mut entry = self
            .records
            .entry(provider)
            .or_insert_with(|| PerformanceRecord::prior(&self.catalog, provider));
        f(entry.value_mut());
        entry.samples += 1;
        entry.last_used = Some(now);
    }

    pub fn reset(&self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn tracker() -> PerformanceTracker {
        PerformanceTracker::with_clock(
            Arc::new(ProviderCatalog::default()),
            Arc::new(ManualClock::new()),
        )
    }

    #[test]
    fn test_priors_from_catalog() {
        let t = tracker();
        let r = t.get(ProviderId::Gpt4oMini);
        assert_eq!(r.samples, 0);
        assert!(r.last_used.is_none());
        assert!((r.avg_latency_ms - 1500.0).abs() < 1e-9);
        assert!((r.avg_cost - 0.0006).abs() < 1e-12);
    }

    #[test]
    fn test_ema_updates() {
        let t = tracker();
        t.record_success(ProviderId::GeminiPro, Duration::from_millis(500), 0.01);
        let r = t.get(ProviderId::GeminiPro);
        // 0.3 * 500 + 0.7 * 2500
        assert!((r.avg_latency_ms - 1900.0).abs() < 1e-9);
        assert!((r.success_rate - (0.3 + 0.7 * 0.94)).abs() < 1e-9);
        assert_eq!(r.samples, 1);
        assert!(r.last_used.is_some());

        t.record_failure(ProviderId::GeminiPro, Duration::from_millis(1900));
        let r2 = t.get(ProviderId::GeminiPro);
        assert!((r2.success_rate - 0.7 * r.success_rate).abs() < 1e-9);
        assert_eq!(r2.avg_cost, r.avg_cost);
    }

    #[test]
    fn test_concurrent_updates_are_all_counted() {
        let t = Arc::new(tracker());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        t.record_success(ProviderId::Gpt4o, Duration::from_millis(100), 0.001);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(t.get(ProviderId::Gpt4o).samples, 200);
    }
}
