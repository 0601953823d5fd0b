//! Read-only view of previously produced analyses.

use crate::types::{DocumentAnalysis, DocumentType, EnhancementSuggestion, ProviderId};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored live result that a degraded response may reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAnalysis {
    pub document_id: String,
    pub document_type: DocumentType,
    pub analysis: DocumentAnalysis,
    pub suggestions: Vec<EnhancementSuggestion>,
    /// Provider that produced the result, if it was a live call.
    pub provider: Option<ProviderId>,
}

/// Lightweight hit returned by [`CacheLookup::find_similar`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarDocument {
    pub document_id: String,
    pub document_type: DocumentType,
    pub overall_score: f64,
}

/// Consumed by the fallback chain only.
#[async_trait]
pub trait CacheLookup: Send + Sync {
    /// Most relevant cached documents of the same type, best first.
    async fn find_similar(
        &self,
        document_type: DocumentType,
        limit: usize,
    ) -> Result<Vec<SimilarDocument>>;

    async fn get(&self, document_id: &str) -> Result<Option<CachedAnalysis>>;

    fn name(&self) -> &'static str;
}

/// Lookup that never finds anything.
pub struct NullCacheLookup;

#[async_trait]
impl CacheLookup for NullCacheLookup {
    async fn find_similar(&self, _: DocumentType, _: usize) -> Result<Vec<SimilarDocument>> {
        Ok(Vec::new())
    }

    async fn get(&self, _: &str) -> Result<Option<CachedAnalysis>> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "null"
    }
}
