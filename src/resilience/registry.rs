//! One circuit breaker per provider, owned by the service that builds it.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics};
use crate::clock::Clock;
use crate::types::ProviderId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub struct BreakerRegistry {
    breakers: BTreeMap<ProviderId, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Build breakers for `providers`, using `overrides` where present.
    pub fn new(
        providers: impl IntoIterator<Item = ProviderId>,
        default: &CircuitBreakerConfig,
        overrides: &HashMap<ProviderId, CircuitBreakerConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let breakers = providers
            .into_iter()
            .map(|id| {
                let cfg = overrides.get(&id).unwrap_or(default).clone();
                (id, Arc::new(CircuitBreaker::with_clock(id, cfg, clock.clone())))
            })
            .collect();
        Self { breakers }
    }

    pub fn get(&self, provider: ProviderId) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(&provider).cloned()
    }

    pub fn providers(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.breakers.keys().copied()
    }

    pub fn reset_all(&self) {
        for cb in self.breakers.values() {
            cb.reset();
        }
    }

    pub fn snapshot_all(&self) -> BTreeMap<ProviderId, CircuitBreakerMetrics> {
        self.breakers
            .iter()
            .map(|(id, cb)| (*id, cb.metrics()))
            .collect()
    }
}
