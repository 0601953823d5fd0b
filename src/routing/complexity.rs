//! Complexity estimation and processing-priority inference.

use crate::types::{Complexity, DocumentSignals, DocumentType, ProcessingPriority, UserTier};

const HIGH_THRESHOLD: f64 = 70.0;
const MEDIUM_THRESHOLD: f64 = 40.0;

/// Weighted composite score before the document-type multiplier.
///
/// | Signal | Weight | Normalisation |
/// |--------|--------|---------------|
/// | inverted quality score | 0.40 | `100 - score` |
/// | flagged issues | 0.25 | `issues × 10`, capped at 100 |
/// | estimated elements | 0.15 | `elements × 2`, capped at 100 |
/// | palette size | 0.10 | `colors × 10`, capped at 100 |
/// | font variety | 0.10 | `fonts × 15`, capped at 100 |
pub fn complexity_score(signals: &DocumentSignals) -> f64 {
    let quality = 100.0 - signals.overall_score.clamp(0.0, 100.0);
    let issues = (signals.issue_count as f64 * 10.0).min(100.0);
    let elements = (estimated_elements(signals) as f64 * 2.0).min(100.0);
    let palette = (signals.palette_size as f64 * 10.0).min(100.0);
    let fonts = (signals.font_count as f64 * 15.0).min(100.0);
    quality * 0.4 + issues * 0.25 + elements * 0.15 + palette * 0.1 + fonts * 0.1
}

fn estimated_elements(signals: &DocumentSignals) -> u64 {
    signals.issue_count as u64
        + signals.suggestion_count as u64 * 2
        + signals.palette_size as u64
        + signals.font_count as u64 * 2
}

pub fn determine_complexity_with_context(
    signals: &DocumentSignals,
    document_type: DocumentType,
) -> Complexity {
    let score = complexity_score(signals) * document_type.complexity_multiplier();
    if score >= HIGH_THRESHOLD {
        Complexity::High
    } else if score >= MEDIUM_THRESHOLD {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}

/// Explicit preference wins; otherwise derived from tier and complexity.
pub fn infer_priority(
    tier: UserTier,
    complexity: Complexity,
    explicit: Option<ProcessingPriority>,
) -> ProcessingPriority {
    if let Some(p) = explicit {
        return p;
    }
    match (tier, complexity) {
        (UserTier::Free, _) => ProcessingPriority::Speed,
        (UserTier::Premium, Complexity::High) => ProcessingPriority::Quality,
        (UserTier::Premium, _) => ProcessingPriority::Balanced,
        (UserTier::Pro, Complexity::High) => ProcessingPriority::Quality,
        (UserTier::Basic | UserTier::Pro, Complexity::Low) => ProcessingPriority::Speed,
        (UserTier::Basic | UserTier::Pro, _) => ProcessingPriority::Balanced,
    }
}
