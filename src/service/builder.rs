use super::EnhancementService;
use crate::cache::{CacheLookup, InMemoryAnalysisCache};
use crate::clock::{self, Clock};
use crate::config::ServiceConfig;
use crate::fallback::{FallbackChain, FallbackStrategy};
use crate::health::HealthMonitor;
use crate::provider::{ProviderClient, ProviderRegistry};
use crate::resilience::{AllowAllRateLimiter, BreakerRegistry, RateLimiter};
use crate::routing::{ExperimentRegistry, ModelSelector, ProviderCatalog};
use crate::telemetry::{self, SelectionSink};
use crate::usage::{CostTracker, NoopCostTracker};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Builder for [`EnhancementService`].
///
/// Every collaborator has a no-op default, so a service needs nothing but providers.
pub struct EnhancementServiceBuilder {
    config: ServiceConfig,
    clients: Vec<Arc<dyn ProviderClient>>,
    catalog: Option<ProviderCatalog>,
    experiments: Option<Arc<ExperimentRegistry>>,
    rate_limiter: Arc<dyn RateLimiter>,
    cost_tracker: Arc<dyn CostTracker>,
    sink: Arc<dyn SelectionSink>,
    result_cache: Option<Arc<InMemoryAnalysisCache>>,
    strategies: Vec<Arc<dyn FallbackStrategy>>,
    clock: Arc<dyn Clock>,
}

impl EnhancementServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
            clients: Vec::new(),
            catalog: None,
            experiments: None,
            rate_limiter: Arc::new(AllowAllRateLimiter),
            cost_tracker: Arc::new(NoopCostTracker),
            sink: telemetry::noop_sink(),
            result_cache: None,
            strategies: Vec::new(),
            clock: clock::system(),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a provider client. A later client with the same id replaces the earlier one.
    pub fn with_provider(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.clients.push(client);
        self
    }

    /// Replace the default routing tables.
    pub fn with_catalog(mut self, catalog: ProviderCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_experiments(mut self, experiments: Arc<ExperimentRegistry>) -> Self {
        self.experiments = Some(experiments);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    pub fn with_cost_tracker(mut self, tracker: Arc<dyn CostTracker>) -> Self {
        self.cost_tracker = tracker;
        self
    }

    /// Inject a selection audit sink. Default is a no-op sink.
    pub fn with_selection_sink(mut self, sink: Arc<dyn SelectionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Keep successful results and offer them to the cached-result fallback strategy.
    pub fn with_result_cache(mut self, cache: Arc<InMemoryAnalysisCache>) -> Self {
        self.result_cache = Some(cache);
        self
    }

    /// Add a strategy to the default fallback chain.
    pub fn with_fallback_strategy(mut self, strategy: Arc<dyn FallbackStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the service.
    ///
    /// Fails when the configuration is structurally invalid or no enabled provider
    /// has been registered.
    pub fn build(self) -> Result<EnhancementService> {
        self.config.ensure_valid()?;

        let mut providers = ProviderRegistry::new();
        for client in self.clients {
            let id = client.id();
            let enabled = self.config.providers.get(&id).map_or(true, |s| s.enabled);
            if enabled {
                providers.register(client);
            } else {
                info!(provider = %id, "provider disabled by configuration; not registered");
            }
        }
        if providers.is_empty() {
            return Err(Error::configuration_with_context(
                "at least one enabled provider must be registered",
                ErrorContext::new().with_source("enhancement_service_builder"),
            ));
        }

        let mut catalog = self
            .catalog
            .unwrap_or_default()
            .with_reliable_default(self.config.default_provider);
        for id in providers.ids() {
            let client = providers.get(id)?;
            let cost = client.cost_per_1k_tokens();
            if cost.is_finite() && cost >= 0.0 {
                catalog = catalog.with_cost(id, cost);
            }
        }
        let catalog = Arc::new(catalog);

        let mut selector = ModelSelector::with_clock(catalog, providers.ids(), self.clock.clone());
        if let Some(experiments) = self.experiments {
            selector = selector.with_experiments(experiments);
        }

        let breakers = BreakerRegistry::new(
            providers.ids(),
            &self.config.breaker,
            &self.config.breaker_overrides,
            self.clock.clone(),
        );
        let health = HealthMonitor::with_clock(
            providers.clone(),
            self.config.health.clone(),
            self.clock.clone(),
        );

        let cache_lookup = self
            .result_cache
            .clone()
            .map(|c| c as Arc<dyn CacheLookup>);
        let mut fallback = FallbackChain::with_defaults(cache_lookup);
        for strategy in self.strategies {
            fallback.register(strategy);
        }

        debug!(
            providers = ?providers.ids(),
            fallback = ?fallback.strategy_names(),
            max_attempts = self.config.max_attempts,
            "enhancement service built"
        );
        Ok(EnhancementService {
            config: self.config,
            providers,
            breakers: Arc::new(breakers),
            health: Arc::new(health),
            selector: Arc::new(selector),
            fallback,
            rate_limiter: self.rate_limiter,
            cost_tracker: self.cost_tracker,
            sink: self.sink,
            result_cache: self.result_cache,
        })
    }
}

impl Default for EnhancementServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::types::{
        DocumentAnalysis, DocumentRef, EnhancementPlan, ProviderId, ProviderReply, RequestContext,
    };
    use async_trait::async_trait;

    struct Fixed(ProviderId, f64);

    #[async_trait]
    impl ProviderClient for Fixed {
        fn id(&self) -> ProviderId {
            self.0
        }

        async fn analyze(
            &self,
            _: &DocumentRef,
            _: &RequestContext,
        ) -> Result<ProviderReply<DocumentAnalysis>> {
            Ok(ProviderReply::ok(DocumentAnalysis::default()))
        }

        async fn generate(
            &self,
            _: &DocumentAnalysis,
            _: &RequestContext,
        ) -> Result<ProviderReply<EnhancementPlan>> {
            Ok(ProviderReply::ok(EnhancementPlan::default()))
        }

        fn cost_per_1k_tokens(&self) -> f64 {
            self.1
        }
    }

    #[test]
    fn test_build_requires_a_provider() {
        let err = EnhancementServiceBuilder::new().build().err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_disabled_providers_are_not_registered() {
        let mut config = ServiceConfig::new();
        config.providers.insert(
            ProviderId::Gpt4o,
            ProviderSettings {
                api_key_env: None,
                enabled: false,
            },
        );
        let service = EnhancementServiceBuilder::new()
            .with_config(config)
            .with_provider(Arc::new(Fixed(ProviderId::Gpt4o, 0.0075)))
            .with_provider(Arc::new(Fixed(ProviderId::Gpt4oMini, 0.0003)))
            .build()
            .unwrap();
        assert!(!service.status_of(ProviderId::Gpt4o).registered);
        assert!(service.status_of(ProviderId::Gpt4oMini).registered);
    }

    #[test]
    fn test_client_cost_overrides_catalog() {
        let service = EnhancementServiceBuilder::new()
            .with_provider(Arc::new(Fixed(ProviderId::GeminiPro, 0.5)))
            .build()
            .unwrap();
        let cost = service.selector().catalog().estimate_cost(ProviderId::GeminiPro, 1000);
        assert!((cost - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ServiceConfig::new().with_provider_timeout(std::time::Duration::from_secs(1));
        let result = EnhancementServiceBuilder::new()
            .with_config(config)
            .with_provider(Arc::new(Fixed(ProviderId::Gpt4oMini, 0.0003)))
            .build();
        assert!(result.is_err());
    }
}
