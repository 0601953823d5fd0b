//! 增强服务模块：端到端编排一次文档增强请求（选择、健康检查、限流、熔断、降级）。
//!
//! # Enhancement Service
//!
//! [`EnhancementService`] drives one request across providers:
//!
//! 1. Build selection criteria (complexity, priority) from the request context
//! 2. Ask the [`ModelSelector`] for an untried candidate
//! 3. Skip candidates the health monitor reports unhealthy, without touching their breaker
//! 4. Consult the rate limiter; a denial consumes the attempt
//! 5. Run analyze then generate, each stage through the provider's breaker with a timeout
//! 6. An open breaker short-circuits to the fallback chain
//! 7. Any other failure is recorded and the next provider is tried
//!
//! After `max_attempts` failed calls the last error propagates. When no call could
//! be attempted at all, the fallback chain answers instead.

mod builder;
mod execution;

pub use builder::EnhancementServiceBuilder;

use crate::cache::{CachedAnalysis, InMemoryAnalysisCache};
use crate::config::{ConfigReport, ServiceConfig};
use crate::fallback::{FallbackChain, FallbackContext};
use crate::health::{HealthMonitor, HealthRecord, HealthStatus};
use crate::provider::ProviderRegistry;
use crate::resilience::{BreakerRegistry, CircuitBreakerMetrics, CircuitState, RateLimiter};
use crate::routing::{ModelSelector, SelectionCriteria};
use crate::telemetry::{SelectionEvent, SelectionSink};
use crate::types::{DocumentRef, EnhancementResult, ProviderId, RequestContext};
use crate::usage::CostTracker;
use crate::{Error, ErrorContext, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Per-provider introspection snapshot.
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    pub provider: ProviderId,
    pub registered: bool,
    pub circuit_state: Option<CircuitState>,
    pub breaker: Option<CircuitBreakerMetrics>,
    pub health: HealthStatus,
    pub health_record: Option<HealthRecord>,
    /// Registered, breaker admitting calls and not unhealthy.
    pub available: bool,
}

/// Orchestrates provider selection, resilience and fallback for document enhancement.
///
/// All per-provider state is shared across concurrent requests; the tried set and
/// selection criteria belong to a single request.
pub struct EnhancementService {
    config: ServiceConfig,
    providers: ProviderRegistry,
    breakers: Arc<BreakerRegistry>,
    health: Arc<HealthMonitor>,
    selector: Arc<ModelSelector>,
    fallback: FallbackChain,
    rate_limiter: Arc<dyn RateLimiter>,
    cost_tracker: Arc<dyn CostTracker>,
    sink: Arc<dyn SelectionSink>,
    result_cache: Option<Arc<InMemoryAnalysisCache>>,
}

impl EnhancementService {
    pub fn builder() -> EnhancementServiceBuilder {
        EnhancementServiceBuilder::new()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn selector(&self) -> &Arc<ModelSelector> {
        &self.selector
    }

    pub fn fallback_chain(&self) -> &FallbackChain {
        &self.fallback
    }

    /// Enhance one document.
    ///
    /// Returns a live result, a degraded fallback result, or the last provider error
    /// once the attempt budget is spent.
    #[instrument(
        skip(self, document, ctx),
        fields(document_id = %document.id, tier = %ctx.tier, document_type = %ctx.document_type)
    )]
    pub async fn analyze_document(
        &self,
        document: &DocumentRef,
        ctx: &RequestContext,
        requester_id: &str,
    ) -> Result<EnhancementResult> {
        let request_id = Uuid::new_v4().to_string();
        let criteria = SelectionCriteria::from_context(ctx).with_requester(requester_id);
        debug!(
            request_id = %request_id,
            complexity = %criteria.complexity,
            priority = %criteria.priority,
            "routing request"
        );

        let mut tried: BTreeSet<ProviderId> = BTreeSet::new();
        let mut skipped: BTreeSet<ProviderId> = BTreeSet::new();
        let mut last_error: Option<Error> = None;
        let mut attempts = 0;

        while attempts < self.config.max_attempts {
            let selection = self.selector.select(&criteria, &tried)?;
            let provider = selection.provider;

            // Only a fallback selection can repeat a skipped provider: nothing healthy is left.
            if skipped.contains(&provider) {
                break;
            }
            if self.health.status(provider) == HealthStatus::Unhealthy {
                warn!(provider = %provider, "skipping unhealthy provider");
                skipped.insert(provider);
                tried.insert(provider);
                continue;
            }

            attempts += 1;
            let decision = self
                .rate_limiter
                .check_limit(provider, requester_id, ctx.tier, criteria.estimated_tokens)
                .await;
            if !decision.allowed {
                let e = Error::rate_limited(
                    provider,
                    format!("request quota exhausted for {}", requester_id),
                    decision.retry_after,
                );
                warn!(
                    provider = %provider,
                    attempt = attempts,
                    retry_after_ms = decision.retry_after.map(|d| d.as_millis() as u64),
                    "rate limit denied provider call"
                );
                let event = SelectionEvent::from_selection(&request_id, requester_id, &selection);
                self.audit(event.failed(Duration::ZERO, e.to_string())).await;
                tried.insert(provider);
                last_error = Some(e);
                continue;
            }

            let client = self.providers.get(provider)?;
            let breaker = self.breakers.get(provider).ok_or_else(|| {
                Error::configuration_with_context(
                    format!("no circuit breaker for {}", provider),
                    ErrorContext::new().with_source("enhancement_service"),
                )
            })?;

            let started = tokio::time::Instant::now();
            let outcome = self
                .execute_stages(client.as_ref(), &breaker, document, ctx)
                .await;
            let latency = started.elapsed();
            let event = SelectionEvent::from_selection(&request_id, requester_id, &selection);

            match outcome {
                Ok(live) => {
                    let result = self
                        .complete(
                            event,
                            requester_id,
                            document,
                            ctx,
                            &criteria,
                            live,
                            latency,
                            tried,
                        )
                        .await;
                    return Ok(result);
                }
                Err(e) if e.is_circuit_open() => {
                    info!(
                        provider = %provider,
                        attempt = attempts,
                        "circuit open; answering from fallback chain"
                    );
                    self.audit(event.failed(latency, e.to_string())).await;
                    tried.insert(provider);
                    return Ok(self
                        .fall_back(document, ctx, format!("circuit open for {}", provider), tried)
                        .await);
                }
                Err(e) => {
                    warn!(
                        provider = %provider,
                        attempt = attempts,
                        max_attempts = self.config.max_attempts,
                        latency_ms = latency.as_millis() as u64,
                        error = %e,
                        "provider call failed"
                    );
                    self.selector.performance().record_failure(provider, latency);
                    self.audit(event.failed(latency, e.to_string())).await;
                    tried.insert(provider);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => {
                error!(attempts, tried = ?tried, error = %e, "every provider attempt failed");
                Err(e)
            }
            None => {
                warn!(skipped = ?skipped, "no healthy provider could be attempted");
                Ok(self
                    .fall_back(document, ctx, "no healthy provider available", tried)
                    .await)
            }
        }
    }

    /// Success bookkeeping: cost, quota, performance feedback, audit and result cache.
    #[allow(clippy::too_many_arguments)]
    async fn complete(
        &self,
        event: SelectionEvent,
        requester_id: &str,
        document: &DocumentRef,
        ctx: &RequestContext,
        criteria: &SelectionCriteria,
        live: execution::LiveOutcome,
        latency: Duration,
        tried: BTreeSet<ProviderId>,
    ) -> EnhancementResult {
        let provider = event.provider;
        let reason = event.reason;
        let tokens = live
            .usage
            .map(|u| u.total_tokens)
            .filter(|t| *t > 0)
            .unwrap_or(criteria.estimated_tokens);
        let cost = live
            .usage
            .map(|u| u.cost)
            .filter(|c| c.is_finite() && *c > 0.0)
            .unwrap_or_else(|| self.selector.catalog().estimate_cost(provider, tokens));

        self.cost_tracker
            .track_usage(provider, requester_id, document, tokens, cost)
            .await;
        self.rate_limiter
            .track_usage(provider, requester_id, tokens, ctx.tier)
            .await;
        self.selector
            .performance()
            .record_success(provider, latency, cost);
        self.audit(event.succeeded(latency, cost)).await;

        if let Some(cache) = &self.result_cache {
            cache.insert(CachedAnalysis {
                document_id: document.id.clone(),
                document_type: ctx.document_type,
                analysis: live.analysis.clone(),
                suggestions: live.plan.suggestions.clone(),
                provider: Some(provider),
            });
        }

        info!(
            provider = %provider,
            reason = %reason,
            latency_ms = latency.as_millis() as u64,
            tokens,
            cost,
            "document enhanced"
        );
        EnhancementResult::from_live(provider, live.analysis, live.plan, live.usage, tried)
    }

    async fn fall_back(
        &self,
        document: &DocumentRef,
        ctx: &RequestContext,
        reason: impl Into<String>,
        tried: BTreeSet<ProviderId>,
    ) -> EnhancementResult {
        let fallback_ctx = FallbackContext::from_request(document, ctx).with_reason(reason);
        let response = self.fallback.execute(&fallback_ctx).await;
        EnhancementResult::from_fallback(response, tried)
    }

    async fn audit(&self, event: SelectionEvent) {
        if let Err(e) = self.sink.record(event).await {
            debug!(error = %e, "selection event not recorded");
        }
    }

    /// Availability, breaker and health snapshot for every known provider.
    pub fn provider_status(&self) -> BTreeMap<ProviderId, ProviderStatus> {
        ProviderId::ALL
            .iter()
            .map(|id| (*id, self.status_of(*id)))
            .collect()
    }

    pub fn status_of(&self, id: ProviderId) -> ProviderStatus {
        let registered = self.providers.contains(id);
        let breaker = self.breakers.get(id);
        let health = self.health.status(id);
        let admitting = breaker.as_ref().is_some_and(|b| b.can_proceed());
        ProviderStatus {
            provider: id,
            registered,
            circuit_state: breaker.as_ref().map(|b| b.state()),
            breaker: breaker.as_ref().map(|b| b.metrics()),
            health,
            health_record: self.health.get_status(id),
            available: registered && admitting && health != HealthStatus::Unhealthy,
        }
    }

    /// Credential and structure report for the service configuration.
    pub fn configuration_report(&self) -> ConfigReport {
        self.config.validate()
    }

    pub fn is_configured(&self) -> bool {
        self.configuration_report().is_configured()
    }

    /// Start periodic health probes for every registered provider.
    pub fn start_health_monitoring(&self) {
        self.health.start();
    }

    /// Stop health probes and shut the selection sink down.
    pub async fn shutdown(&self) {
        self.health.shutdown().await;
        if let Err(e) = self.sink.shutdown().await {
            warn!(error = %e, "selection sink shutdown failed");
        }
        info!("enhancement service stopped");
    }
}
