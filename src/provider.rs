//! Provider capability interface and the provider registry.
//!
//! One implementation per remote model; the registry keys clients by [`ProviderId`].

use crate::types::{
    DocumentAnalysis, DocumentRef, DocumentType, EnhancementPlan, ProviderId, ProviderReply,
    RequestContext, Usage, UserTier,
};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Short token a healthy provider echoes back from a probe.
pub const PROBE_TOKEN: &str = "OK";

#[derive(Debug, Clone)]
pub struct ProbeReply {
    pub text: String,
    pub usage: Option<Usage>,
}

impl ProbeReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }

    /// The reply carries the token as a standalone word.
    pub fn is_expected(&self) -> bool {
        self.text
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word.eq_ignore_ascii_case(PROBE_TOKEN))
    }
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Stage one: inspect the document.
    async fn analyze(
        &self,
        document: &DocumentRef,
        ctx: &RequestContext,
    ) -> Result<ProviderReply<DocumentAnalysis>>;

    /// Stage two: derive enhancement suggestions from an analysis.
    async fn generate(
        &self,
        analysis: &DocumentAnalysis,
        ctx: &RequestContext,
    ) -> Result<ProviderReply<EnhancementPlan>>;

    /// USD per 1k tokens, used for cost estimates before a call.
    fn cost_per_1k_tokens(&self) -> f64;

    /// Cheapest possible liveness call.
    ///
    /// Clients without a dedicated endpoint fall back to a generation call on a
    /// placeholder analysis; override this when the provider offers something lighter.
    async fn probe(&self) -> Result<ProbeReply> {
        let placeholder = DocumentAnalysis {
            document_id: "health-probe".into(),
            overall_score: 100.0,
            summary: format!("Health check: answer with the single word {}", PROBE_TOKEN),
            ..Default::default()
        };
        let ctx = RequestContext::new(UserTier::Free, DocumentType::Other);
        let (plan, usage) = self.generate(&placeholder, &ctx).await?.into_result(self.id())?;
        let text = plan
            .suggestions
            .iter()
            .flat_map(|s| [s.title.as_str(), s.description.as_str()])
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ProbeReply { text, usage })
    }
}

/// Registered provider clients, keyed by identity.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: BTreeMap<ProviderId, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own id; a later registration replaces an earlier one.
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.id(), client);
    }

    pub fn get(&self, id: ProviderId) -> Result<Arc<dyn ProviderClient>> {
        self.clients.get(&id).cloned().ok_or_else(|| {
            Error::configuration_with_context(
                format!("provider {} is not registered", id),
                ErrorContext::new().with_source("provider_registry"),
            )
        })
    }

    pub fn contains(&self, id: ProviderId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.clients.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::health::{HealthConfig, HealthMonitor, HealthStatus};
    use crate::types::{EnhancementSuggestion, SuggestionImpact};

    #[derive(Clone, Copy)]
    enum Echo {
        Token,
        Garbled,
        Empty,
        Failed,
    }

    struct EchoProvider {
        reply: Echo,
    }

    #[async_trait]
    impl ProviderClient for EchoProvider {
        fn id(&self) -> ProviderId {
            ProviderId::GeminiPro
        }

        async fn analyze(
            &self,
            document: &DocumentRef,
            _ctx: &RequestContext,
        ) -> Result<ProviderReply<DocumentAnalysis>> {
            Ok(ProviderReply::ok(DocumentAnalysis {
                document_id: document.id.clone(),
                ..Default::default()
            }))
        }

        async fn generate(
            &self,
            _analysis: &DocumentAnalysis,
            _ctx: &RequestContext,
        ) -> Result<ProviderReply<EnhancementPlan>> {
            let echoed = |title: &str| EnhancementPlan {
                suggestions: vec![EnhancementSuggestion::new(title, "", SuggestionImpact::Low)],
                estimated_seconds: None,
            };
            match self.reply {
                Echo::Token => Ok(ProviderReply::ok(echoed("OK"))),
                Echo::Garbled => Ok(ProviderReply::ok(echoed("zzz garbled"))),
                Echo::Empty => Ok(ProviderReply::ok(EnhancementPlan::default())),
                Echo::Failed => Ok(ProviderReply::failed("upstream 502")),
            }
        }

        fn cost_per_1k_tokens(&self) -> f64 {
            0.00125
        }
    }

    #[tokio::test]
    async fn test_default_probe_uses_generation() {
        let ok = EchoProvider { reply: Echo::Token };
        assert!(ok.probe().await.unwrap().is_expected());
        let bad = EchoProvider { reply: Echo::Failed };
        assert!(bad.probe().await.is_err());
    }

    #[tokio::test]
    async fn test_default_probe_reports_what_was_generated() {
        let garbled = EchoProvider {
            reply: Echo::Garbled,
        };
        let reply = garbled.probe().await.unwrap();
        assert!(reply.text.contains("garbled"));
        assert!(!reply.is_expected());
        let empty = EchoProvider { reply: Echo::Empty };
        assert!(!empty.probe().await.unwrap().is_expected());
    }

    #[tokio::test]
    async fn test_mismatched_generation_fails_health_check() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoProvider {
            reply: Echo::Garbled,
        }));
        let monitor = HealthMonitor::new(registry, HealthConfig::default());
        let record = monitor.check_now(ProviderId::GeminiPro).await.unwrap();
        assert_ne!(record.status, HealthStatus::Healthy);
        assert_eq!(record.consecutive_failures, 1);
        let last = record.recent.back().unwrap();
        assert!(!last.success);
        assert!(last.error.as_deref().unwrap().contains("unexpected probe reply"));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoProvider { reply: Echo::Token }));
        assert!(registry.contains(ProviderId::GeminiPro));
        assert_eq!(registry.ids(), vec![ProviderId::GeminiPro]);
        assert!(registry.get(ProviderId::Gpt4o).is_err());
    }

    #[test]
    fn test_probe_reply_token_match() {
        assert!(ProbeReply::new("ok").is_expected());
        assert!(!ProbeReply::new("nope").is_expected());
        assert!(ProbeReply::new("Status: OK.").is_expected());
        assert!(!ProbeReply::new("lookbook").is_expected());
    }
}
