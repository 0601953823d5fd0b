//! Shared mock provider for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use doc_enhance_core::provider::{ProbeReply, ProviderClient};
use doc_enhance_core::types::{
    DocumentAnalysis, DocumentRef, EnhancementPlan, EnhancementSuggestion, ProviderId,
    ProviderReply, RequestContext, SuggestionImpact, Usage,
};
use doc_enhance_core::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    /// Transient provider error
    Fail(String),
    /// Unsuccessful reply that reads as throttling
    Throttled,
    /// Fail while the shared call counter is below the limit, then succeed
    FailFirst { counter: Arc<AtomicU32>, limit: u32 },
}

pub struct MockProvider {
    id: ProviderId,
    behavior: Mutex<Behavior>,
    probe_ok: AtomicBool,
    analyze_calls: AtomicU32,
    generate_calls: AtomicU32,
    probe_calls: AtomicU32,
}

impl MockProvider {
    pub fn new(id: ProviderId, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id,
            behavior: Mutex::new(behavior),
            probe_ok: AtomicBool::new(true),
            analyze_calls: AtomicU32::new(0),
            generate_calls: AtomicU32::new(0),
            probe_calls: AtomicU32::new(0),
        })
    }

    pub fn succeeding(id: ProviderId) -> Arc<Self> {
        Self::new(id, Behavior::Succeed)
    }

    pub fn failing(id: ProviderId) -> Arc<Self> {
        Self::new(id, Behavior::Fail("upstream returned 503".into()))
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_probe_ok(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::SeqCst);
    }

    pub fn analyze_calls(&self) -> u32 {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> u32 {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> u32 {
        self.probe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn analyze(
        &self,
        document: &DocumentRef,
        _ctx: &RequestContext,
    ) -> Result<ProviderReply<DocumentAnalysis>> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            Behavior::Succeed => {}
            Behavior::Fail(message) => return Err(Error::provider(self.id, message)),
            Behavior::Throttled => return Ok(ProviderReply::failed("429 Too Many Requests")),
            Behavior::FailFirst { counter, limit } => {
                if counter.fetch_add(1, Ordering::SeqCst) < limit {
                    return Err(Error::provider(self.id, "connection reset by peer"));
                }
            }
        }
        Ok(ProviderReply::ok(DocumentAnalysis {
            document_id: document.id.clone(),
            overall_score: 58.0,
            summary: format!("analysed by {}", self.id),
            issues: vec!["inconsistent spacing".into()],
            strengths: vec!["clear headings".into()],
        })
        .with_usage(Usage::new(600, 150, 0.0)))
    }

    async fn generate(
        &self,
        _analysis: &DocumentAnalysis,
        _ctx: &RequestContext,
    ) -> Result<ProviderReply<EnhancementPlan>> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderReply::ok(EnhancementPlan {
            suggestions: vec![
                EnhancementSuggestion::new(
                    "Even spacing",
                    "Use one spacing scale.",
                    SuggestionImpact::Medium,
                ),
                EnhancementSuggestion::new(
                    "Stronger title",
                    "Enlarge the title.",
                    SuggestionImpact::High,
                ),
            ],
            estimated_seconds: None,
        })
        .with_usage(Usage::new(300, 450, 0.0)))
    }

    fn cost_per_1k_tokens(&self) -> f64 {
        0.001
    }

    async fn probe(&self) -> Result<ProbeReply> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe_ok.load(Ordering::SeqCst) {
            Ok(ProbeReply::new("OK"))
        } else {
            Err(Error::provider(self.id, "probe failed: 502 Bad Gateway"))
        }
    }
}
