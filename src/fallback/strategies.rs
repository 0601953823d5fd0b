//! Built-in fallback strategies, highest priority first.

use super::strategy::{FallbackContext, FallbackStrategy};
use crate::cache::CacheLookup;
use crate::types::{
    DocumentAnalysis, DocumentType, EnhancementSuggestion, GenerationResponse, ResponseSource,
    SuggestionImpact, UserTier,
};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const SIMILAR_LIMIT: usize = 3;

/// Reuses a cached analysis of this or a similar document. Premium tier only.
pub struct CachedResultStrategy {
    cache: Arc<dyn CacheLookup>,
}

impl CachedResultStrategy {
    pub fn new(cache: Arc<dyn CacheLookup>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl FallbackStrategy for CachedResultStrategy {
    fn name(&self) -> &'static str {
        "cached-result"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn can_handle(&self, _: DocumentType, tier: UserTier) -> bool {
        tier == UserTier::Premium
    }

    async fn execute(&self, ctx: &FallbackContext) -> Result<GenerationResponse> {
        let exact = self.cache.get(&ctx.document.id).await?;
        let cached = match exact {
            Some(hit) => Some(hit),
            None => {
                let mut found = None;
                for candidate in self.cache.find_similar(ctx.document_type, SIMILAR_LIMIT).await? {
                    if let Some(hit) = self.cache.get(&candidate.document_id).await? {
                        found = Some(hit);
                        break;
                    }
                }
                found
            }
        };
        let Some(cached) = cached else {
            return Err(Error::runtime_with_context(
                "no cached analysis for this document type",
                ErrorContext::new()
                    .with_source("cached_result_strategy")
                    .with_details(self.cache.name()),
            ));
        };
        debug!(source_document = %cached.document_id, "serving cached analysis");
        Ok(GenerationResponse::degraded(
            ResponseSource::Cache,
            "AI analysis is temporarily unavailable; showing suggestions from a recent \
             analysis of a similar document.",
        )
        .with_analysis(cached.analysis)
        .with_suggestions(cached.suggestions))
    }
}

fn s(title: &str, description: &str, impact: SuggestionImpact) -> EnhancementSuggestion {
    EnhancementSuggestion::new(title, description, impact)
}

static TEMPLATES: Lazy<HashMap<DocumentType, Vec<EnhancementSuggestion>>> = Lazy::new(|| {
    use SuggestionImpact::*;
    HashMap::from([
        (
            DocumentType::Resume,
            vec![
                s("Lead with impact", "Open each role with a measurable achievement.", High),
                s(
                    "Consistent section headings",
                    "Use one heading style for every section.",
                    Medium,
                ),
                s(
                    "Trim to two pages",
                    "Drop roles older than fifteen years unless directly relevant.",
                    Medium,
                ),
            ],
        ),
        (
            DocumentType::CoverLetter,
            vec![
                s(
                    "Name the role early",
                    "State the position and company in the first sentence.",
                    High,
                ),
                s(
                    "One story, not a list",
                    "Expand one relevant accomplishment instead of repeating the resume.",
                    Medium,
                ),
                s("Close with a call to action", "End by proposing a concrete next step.", Low),
            ],
        ),
        (
            DocumentType::Presentation,
            vec![
                s("One idea per slide", "Split slides that carry more than one message.", High),
                s("Larger type", "Keep body text at 24pt or more for projected decks.", Medium),
                s(
                    "Consistent layout grid",
                    "Align titles and content blocks to the same positions.",
                    Medium,
                ),
            ],
        ),
        (
            DocumentType::Marketing,
            vec![
                s(
                    "Single focal point",
                    "Give the headline or hero image clear visual dominance.",
                    High,
                ),
                s(
                    "Visible call to action",
                    "Use a contrasting color for the primary action.",
                    High,
                ),
                s("Limit the palette", "Stay within three brand colors plus neutrals.", Medium),
            ],
        ),
        (
            DocumentType::Report,
            vec![
                s("Executive summary first", "Summarise findings on the opening page.", High),
                s(
                    "Label every chart",
                    "Give each figure a title, axis labels and a source.",
                    Medium,
                ),
                s("Numbered sections", "Number headings so readers can cross-reference.", Low),
            ],
        ),
        (
            DocumentType::Academic,
            vec![
                s(
                    "Structured abstract",
                    "Cover aim, method, result and conclusion in the abstract.",
                    High,
                ),
                s("Consistent citation style", "Apply one citation format throughout.", Medium),
                s("Readable figures", "Ensure figure text remains legible when printed.", Medium),
            ],
        ),
    ])
});

static GENERIC_TEMPLATE: Lazy<Vec<EnhancementSuggestion>> = Lazy::new(|| {
    use SuggestionImpact::*;
    vec![
        s(
            "Clear visual hierarchy",
            "Make headings, body text and captions visibly distinct.",
            High,
        ),
        s("Generous white space", "Increase margins and spacing between blocks.", Medium),
        s("Two font families at most", "Pair one heading font with one body font.", Medium),
    ]
});

/// Static best-practice suggestions per document type; always applicable.
#[derive(Default)]
pub struct TemplateStrategy;

impl TemplateStrategy {
    pub fn new() -> Self {
        Self
    }

    pub fn template_for(document_type: DocumentType) -> &'static [EnhancementSuggestion] {
        TEMPLATES
            .get(&document_type)
            .map(Vec::as_slice)
            .unwrap_or(GENERIC_TEMPLATE.as_slice())
    }
}

#[async_trait]
impl FallbackStrategy for TemplateStrategy {
    fn name(&self) -> &'static str {
        "template"
    }

    fn priority(&self) -> u32 {
        80
    }

    fn can_handle(&self, _: DocumentType, _: UserTier) -> bool {
        true
    }

    async fn execute(&self, ctx: &FallbackContext) -> Result<GenerationResponse> {
        Ok(GenerationResponse::degraded(
            ResponseSource::Template,
            format!(
                "AI analysis is temporarily unavailable; showing general {} guidance.",
                ctx.document_type
            ),
        )
        .with_suggestions(Self::template_for(ctx.document_type).to_vec()))
    }
}

/// Heuristic suggestions from the request's document signals. Not offered to the free tier.
#[derive(Default)]
pub struct RuleBasedStrategy;

impl RuleBasedStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FallbackStrategy for RuleBasedStrategy {
    fn name(&self) -> &'static str {
        "rule-based"
    }

    fn priority(&self) -> u32 {
        60
    }

    fn can_handle(&self, _: DocumentType, tier: UserTier) -> bool {
        tier != UserTier::Free
    }

    async fn execute(&self, ctx: &FallbackContext) -> Result<GenerationResponse> {
        use SuggestionImpact::*;
        let signals = ctx.signals.as_ref().ok_or_else(|| {
            Error::runtime_with_context(
                "rule-based suggestions need document signals",
                ErrorContext::new().with_source("rule_based_strategy"),
            )
        })?;

        let mut suggestions = Vec::new();
        if signals.overall_score < 50.0 {
            suggestions.push(s(
                "Simplify the layout",
                "Reduce the number of competing elements on each page.",
                High,
            ));
        }
        if signals.issue_count > 0 {
            suggestions.push(s(
                "Resolve flagged issues",
                &format!(
                    "{} layout issues were detected; fix alignment and spacing first.",
                    signals.issue_count
                ),
                High,
            ));
        }
        if signals.palette_size > 5 {
            suggestions.push(s(
                "Reduce the color palette",
                "Limit the design to three or four colors.",
                Medium,
            ));
        }
        if signals.font_count > 3 {
            suggestions.push(s("Consolidate fonts", "Use at most two font families.", Medium));
        }
        if suggestions.is_empty() {
            suggestions.push(s(
                "Polish spacing",
                "Even out spacing between related elements.",
                Low,
            ));
        }

        let analysis = DocumentAnalysis {
            document_id: ctx.document.id.clone(),
            overall_score: signals.overall_score,
            summary: "Basic automated review".to_string(),
            ..Default::default()
        };
        Ok(GenerationResponse::degraded(
            ResponseSource::BasicAi,
            "AI analysis is temporarily unavailable; these suggestions come from a basic \
             automated review.",
        )
        .with_analysis(analysis)
        .with_suggestions(suggestions))
    }
}

/// Apology with no content. Always applicable and never fails.
#[derive(Default)]
pub struct GracefulDegradationStrategy;

impl GracefulDegradationStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FallbackStrategy for GracefulDegradationStrategy {
    fn name(&self) -> &'static str {
        "graceful-degradation"
    }

    fn priority(&self) -> u32 {
        0
    }

    fn can_handle(&self, _: DocumentType, _: UserTier) -> bool {
        true
    }

    async fn execute(&self, _: &FallbackContext) -> Result<GenerationResponse> {
        Ok(GenerationResponse::degraded(
            ResponseSource::None,
            "Our enhancement service is busy right now. Your document is safe; please try \
             again in a few minutes.",
        ))
    }
}
