use crate::types::{
    DocumentRef, DocumentSignals, DocumentType, GenerationResponse, RequestContext, UserTier,
};
use crate::Result;
use async_trait::async_trait;

/// The original request, as handed to fallback strategies.
#[derive(Debug, Clone)]
pub struct FallbackContext {
    pub document: DocumentRef,
    pub tier: UserTier,
    pub document_type: DocumentType,
    pub signals: Option<DocumentSignals>,
    /// Why live providers were not used, for logging only.
    pub reason: Option<String>,
}

impl FallbackContext {
    pub fn new(document: DocumentRef, tier: UserTier) -> Self {
        let document_type = document.document_type;
        Self {
            document,
            tier,
            document_type,
            signals: None,
            reason: None,
        }
    }

    pub fn from_request(document: &DocumentRef, ctx: &RequestContext) -> Self {
        Self {
            document: document.clone(),
            tier: ctx.tier,
            document_type: ctx.document_type,
            signals: ctx.signals.clone(),
            reason: None,
        }
    }

    pub fn with_signals(mut self, signals: DocumentSignals) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// One way of producing a degraded response.
///
/// The chain tries strategies in descending [`priority`](Self::priority) order and
/// uses the first one that accepts the request and returns `Ok`.
#[async_trait]
pub trait FallbackStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn priority(&self) -> u32;

    fn can_handle(&self, document_type: DocumentType, tier: UserTier) -> bool;

    async fn execute(&self, ctx: &FallbackContext) -> Result<GenerationResponse>;
}
