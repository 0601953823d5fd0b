//! Provider replies, usage accounting and enhancement results.

use super::provider::ProviderId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Token and cost usage reported by a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// USD.
    pub cost: f64,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32, cost: f64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            cost,
        }
    }

    pub fn merge(self, other: Usage) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens.saturating_add(other.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(other.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(other.total_tokens),
            cost: self.cost + other.cost,
        }
    }
}

/// Raw outcome of one provider call, as returned by a provider client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReply<T> {
    pub success: bool,
    pub payload: Option<T>,
    pub error: Option<String>,
    pub usage: Option<Usage>,
}

impl<T> ProviderReply<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
            usage: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Unsuccessful or empty replies become provider errors.
    pub fn into_result(self, provider: ProviderId) -> Result<(T, Option<Usage>)> {
        match (self.success, self.payload) {
            (true, Some(payload)) => Ok((payload, self.usage)),
            (true, None) => Err(Error::provider(provider, "empty payload")),
            (false, _) => {
                let message = self.error.unwrap_or_else(|| "unknown provider error".into());
                if crate::resilience::classification::is_rate_limit_message(&message) {
                    Err(Error::rate_limited(provider, message, None))
                } else {
                    Err(Error::provider(provider, message))
                }
            }
        }
    }
}

/// First-stage output: what the provider found in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DocumentAnalysis {
    pub document_id: String,
    pub overall_score: f64,
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionImpact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementSuggestion {
    pub title: String,
    pub description: String,
    pub impact: SuggestionImpact,
}

impl EnhancementSuggestion {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        impact: SuggestionImpact,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            impact,
        }
    }
}

/// Second-stage output: the enhancement suggestions derived from an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EnhancementPlan {
    pub suggestions: Vec<EnhancementSuggestion>,
    #[serde(default)]
    pub estimated_seconds: Option<u64>,
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    Provider,
    Cache,
    Template,
    BasicAi,
    None,
}

impl ResponseSource {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, ResponseSource::Provider)
    }
}

/// Output of a provider call or a fallback strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub success: bool,
    pub analysis: Option<DocumentAnalysis>,
    pub suggestions: Vec<EnhancementSuggestion>,
    pub usage: Option<Usage>,
    pub degraded: bool,
    pub source: ResponseSource,
    /// Human-readable note for degraded responses.
    pub message: Option<String>,
}

impl GenerationResponse {
    pub fn degraded(source: ResponseSource, message: impl Into<String>) -> Self {
        Self {
            success: true,
            analysis: None,
            suggestions: Vec::new(),
            usage: None,
            degraded: true,
            source,
            message: Some(message.into()),
        }
    }

    pub fn with_analysis(mut self, analysis: DocumentAnalysis) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<EnhancementSuggestion>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

/// Result handed back to the request layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementResult {
    pub analysis: Option<DocumentAnalysis>,
    pub suggestions: Vec<EnhancementSuggestion>,
    pub model_used: Option<ProviderId>,
    pub estimated_time: Duration,
    /// Providers that were tried and failed (or were skipped) before the outcome.
    pub attempted: BTreeSet<ProviderId>,
    pub usage: Option<Usage>,
    pub degraded: bool,
    pub source: ResponseSource,
    pub message: Option<String>,
}

/// Per-suggestion effort used when the provider gives no estimate.
const SECONDS_PER_SUGGESTION: u64 = 30;

impl EnhancementResult {
    pub(crate) fn from_live(
        provider: ProviderId,
        analysis: DocumentAnalysis,
        plan: EnhancementPlan,
        usage: Option<Usage>,
        attempted: BTreeSet<ProviderId>,
    ) -> Self {
        let estimated = plan
            .estimated_seconds
            .unwrap_or(SECONDS_PER_SUGGESTION * plan.suggestions.len() as u64);
        Self {
            analysis: Some(analysis),
            suggestions: plan.suggestions,
            model_used: Some(provider),
            estimated_time: Duration::from_secs(estimated),
            attempted,
            usage,
            degraded: false,
            source: ResponseSource::Provider,
            message: None,
        }
    }

    pub(crate) fn from_fallback(
        response: GenerationResponse,
        attempted: BTreeSet<ProviderId>,
    ) -> Self {
        let estimated = SECONDS_PER_SUGGESTION * response.suggestions.len() as u64;
        Self {
            analysis: response.analysis,
            suggestions: response.suggestions,
            model_used: None,
            estimated_time: Duration::from_secs(estimated),
            attempted,
            usage: response.usage,
            degraded: response.degraded,
            source: response.source,
            message: response.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_reply_maps_rate_limit() {
        let reply: ProviderReply<DocumentAnalysis> = ProviderReply::failed("429 Too Many Requests");
        let err = reply.into_result(ProviderId::Gpt4o).unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
    }

    #[test]
    fn test_success_without_payload_is_error() {
        let reply = ProviderReply::<DocumentAnalysis> {
            success: true,
            payload: None,
            error: None,
            usage: None,
        };
        assert!(reply.into_result(ProviderId::GeminiPro).is_err());
    }

    #[test]
    fn test_usage_merge() {
        let total = Usage::new(100, 50, 0.01).merge(Usage::new(10, 5, 0.002));
        assert_eq!(total.total_tokens, 165);
        assert!((total.cost - 0.012).abs() < 1e-9);
    }
}
