use super::strategies::{
    CachedResultStrategy, GracefulDegradationStrategy, RuleBasedStrategy, TemplateStrategy,
};
use super::strategy::{FallbackContext, FallbackStrategy};
use crate::cache::CacheLookup;
use crate::types::{GenerationResponse, ResponseSource};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const TERMINAL_MESSAGE: &str = "Service unavailable, please try again later.";

/// Strategies ordered by descending priority.
#[derive(Clone, Default)]
pub struct FallbackChain {
    strategies: Vec<Arc<dyn FallbackStrategy>>,
}

impl FallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template, rule-based and graceful degradation, plus cached results when a cache is given.
    pub fn with_defaults(cache: Option<Arc<dyn CacheLookup>>) -> Self {
        let mut chain = Self::new();
        if let Some(cache) = cache {
            chain.register(Arc::new(CachedResultStrategy::new(cache)));
        }
        chain.register(Arc::new(TemplateStrategy::new()));
        chain.register(Arc::new(RuleBasedStrategy::new()));
        chain.register(Arc::new(GracefulDegradationStrategy::new()));
        chain
    }

    /// Insert keeping descending priority; equal priorities keep registration order.
    pub fn register(&mut self, strategy: Arc<dyn FallbackStrategy>) {
        let at = self
            .strategies
            .iter()
            .position(|s| s.priority() < strategy.priority())
            .unwrap_or(self.strategies.len());
        self.strategies.insert(at, strategy);
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn FallbackStrategy>) -> Self {
        self.register(strategy);
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// First applicable strategy that succeeds; never fails.
    ///
    /// Strategies that return an error or panic are skipped. When none remains, a
    /// terminal "service unavailable" response is returned.
    pub async fn execute(&self, ctx: &FallbackContext) -> GenerationResponse {
        for strategy in &self.strategies {
            let name = strategy.name();
            let applicable = std::panic::catch_unwind(AssertUnwindSafe(|| {
                strategy.can_handle(ctx.document_type, ctx.tier)
            }));
            match applicable {
                Ok(true) => {}
                Ok(false) => {
                    debug!(strategy = name, tier = %ctx.tier, "fallback strategy not applicable");
                    continue;
                }
                Err(_) => {
                    error!(strategy = name, "fallback strategy panicked in can_handle");
                    continue;
                }
            }

            match AssertUnwindSafe(strategy.execute(ctx)).catch_unwind().await {
                Ok(Ok(mut response)) => {
                    response.degraded = response.degraded || response.source.is_degraded();
                    info!(
                        strategy = name,
                        source = ?response.source,
                        document_type = %ctx.document_type,
                        reason = ctx.reason.as_deref().unwrap_or(""),
                        "served fallback response"
                    );
                    return response;
                }
                Ok(Err(e)) => {
                    warn!(strategy = name, error = %e, "fallback strategy failed");
                }
                Err(_) => {
                    error!(strategy = name, "fallback strategy panicked");
                }
            }
        }
        warn!(
            document_type = %ctx.document_type,
            tier = %ctx.tier,
            "every fallback strategy exhausted"
        );
        let mut terminal = GenerationResponse::degraded(ResponseSource::None, TERMINAL_MESSAGE);
        terminal.success = false;
        terminal
    }
}
