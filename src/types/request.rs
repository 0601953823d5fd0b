//! Document references and request context.

use super::provider::{DocumentType, ProcessingPriority, UserTier};
use serde::{Deserialize, Serialize};

/// Reference to a stored document. The core never reads document bytes itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub document_type: DocumentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl DocumentRef {
    pub fn new(id: impl Into<String>, document_type: DocumentType) -> Self {
        Self {
            id: id.into(),
            document_type,
            uri: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }
}

/// Cheap pre-analysis signals about a document, used for complexity estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSignals {
    /// Overall quality score, 0-100 (higher is better).
    pub overall_score: f64,
    pub issue_count: u32,
    pub suggestion_count: u32,
    pub palette_size: u32,
    pub font_count: u32,
}

impl Default for DocumentSignals {
    fn default() -> Self {
        Self {
            overall_score: 60.0,
            issue_count: 0,
            suggestion_count: 0,
            palette_size: 0,
            font_count: 0,
        }
    }
}

/// Per-request routing inputs supplied by the request layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub tier: UserTier,
    pub document_type: DocumentType,
    /// Explicit user preference; always wins over inference.
    #[serde(default)]
    pub priority: Option<ProcessingPriority>,
    #[serde(default)]
    pub estimated_tokens: Option<u32>,
    #[serde(default)]
    pub cost_optimize: bool,
    #[serde(default)]
    pub signals: Option<DocumentSignals>,
}

impl RequestContext {
    pub fn new(tier: UserTier, document_type: DocumentType) -> Self {
        Self {
            tier,
            document_type,
            priority: None,
            estimated_tokens: None,
            cost_optimize: false,
            signals: None,
        }
    }

    pub fn with_priority(mut self, priority: ProcessingPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_estimated_tokens(mut self, tokens: u32) -> Self {
        self.estimated_tokens = Some(tokens);
        self
    }

    pub fn with_cost_optimization(mut self, enabled: bool) -> Self {
        self.cost_optimize = enabled;
        self
    }

    pub fn with_signals(mut self, signals: DocumentSignals) -> Self {
        self.signals = Some(signals);
        self
    }
}
