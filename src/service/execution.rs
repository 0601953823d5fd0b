//! 供应商调用执行：单个供应商的两阶段调用（分析、生成），每阶段独立经过熔断器与超时。
//!
//! Single-provider execution. Higher-level attempt and fallback policy lives in the caller.

use super::EnhancementService;
use crate::provider::ProviderClient;
use crate::resilience::CircuitBreaker;
use crate::types::{
    DocumentAnalysis, DocumentRef, EnhancementPlan, ProviderId, RequestContext, Usage,
};
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Both stages of a successful live call.
#[derive(Debug)]
pub(crate) struct LiveOutcome {
    pub analysis: DocumentAnalysis,
    pub plan: EnhancementPlan,
    pub usage: Option<Usage>,
}

impl EnhancementService {
    /// Analyze, then generate. Each stage is admitted by the breaker separately and
    /// bounded by the provider timeout; a timeout counts as a breaker failure.
    pub(crate) async fn execute_stages(
        &self,
        client: &dyn ProviderClient,
        breaker: &CircuitBreaker,
        document: &DocumentRef,
        ctx: &RequestContext,
    ) -> Result<LiveOutcome> {
        let provider = client.id();
        let limit = self.config.provider_timeout;

        let (analysis, analysis_usage) = breaker
            .execute(move || {
                with_timeout(provider, limit, async move {
                    client.analyze(document, ctx).await?.into_result(provider)
                })
            })
            .await?;
        debug!(provider = %provider, score = analysis.overall_score, "analysis stage complete");

        let analyzed = &analysis;
        let (plan, plan_usage) = breaker
            .execute(move || {
                with_timeout(provider, limit, async move {
                    client.generate(analyzed, ctx).await?.into_result(provider)
                })
            })
            .await?;
        debug!(
            provider = %provider,
            suggestions = plan.suggestions.len(),
            "generation stage complete"
        );

        let usage = match (analysis_usage, plan_usage) {
            (Some(a), Some(b)) => Some(a.merge(b)),
            (a, b) => a.or(b),
        };
        Ok(LiveOutcome {
            analysis,
            plan,
            usage,
        })
    }
}

async fn with_timeout<T>(
    provider: ProviderId,
    limit: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(outcome) => outcome,
        Err(_) => Err(Error::Timeout {
            provider,
            elapsed: limit,
        }),
    }
}
