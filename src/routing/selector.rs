//! Candidate narrowing and weighted scoring for one request.
//!
//! The score weights are listed under "Scoring" in the [routing module docs](super).

use super::catalog::{ProviderCatalog, DEFAULT_ESTIMATED_TOKENS};
use super::complexity::{determine_complexity_with_context, infer_priority};
use super::experiments::ExperimentRegistry;
use super::performance::PerformanceTracker;
use crate::clock::{self, Clock};
use crate::types::{
    Complexity, DocumentType, ProcessingPriority, ProviderId, RequestContext, UserTier,
};
use crate::{Error, ErrorContext, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const LATENCY_SCALE_MS: f64 = 20_000.0;
const COST_SCALE_USD: f64 = 0.05;
const RECENCY_SCALE: Duration = Duration::from_secs(7 * 24 * 3600);
const MAX_AFFINITY_BONUS: f64 = 0.3;
const SCORE_EPSILON: f64 = 1e-9;

/// Routing inputs for one request, owned by that request.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionCriteria {
    pub tier: UserTier,
    pub document_type: DocumentType,
    pub complexity: Complexity,
    pub priority: ProcessingPriority,
    /// Whether `priority` came from the user rather than inference.
    pub explicit_priority: bool,
    pub cost_optimize: bool,
    pub estimated_tokens: u32,
    pub requester_id: Option<String>,
}

impl SelectionCriteria {
    pub fn new(tier: UserTier, document_type: DocumentType) -> Self {
        Self {
            tier,
            document_type,
            complexity: Complexity::Medium,
            priority: infer_priority(tier, Complexity::Medium, None),
            explicit_priority: false,
            cost_optimize: false,
            estimated_tokens: DEFAULT_ESTIMATED_TOKENS,
            requester_id: None,
        }
    }

    /// Complexity from the request's signals (medium when absent), then priority.
    pub fn from_context(ctx: &RequestContext) -> Self {
        let complexity = ctx
            .signals
            .as_ref()
            .map(|s| determine_complexity_with_context(s, ctx.document_type))
            .unwrap_or(Complexity::Medium);
        Self {
            tier: ctx.tier,
            document_type: ctx.document_type,
            complexity,
            priority: infer_priority(ctx.tier, complexity, ctx.priority),
            explicit_priority: ctx.priority.is_some(),
            cost_optimize: ctx.cost_optimize,
            estimated_tokens: ctx.estimated_tokens.unwrap_or(DEFAULT_ESTIMATED_TOKENS),
            requester_id: None,
        }
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        if !self.explicit_priority {
            self.priority = infer_priority(self.tier, complexity, None);
        }
        self
    }

    pub fn with_priority(mut self, priority: ProcessingPriority) -> Self {
        self.priority = priority;
        self.explicit_priority = true;
        self
    }

    pub fn with_cost_optimization(mut self, enabled: bool) -> Self {
        self.cost_optimize = enabled;
        self
    }

    pub fn with_estimated_tokens(mut self, tokens: u32) -> Self {
        self.estimated_tokens = tokens;
        self
    }

    pub fn with_requester(mut self, requester_id: impl Into<String>) -> Self {
        self.requester_id = Some(requester_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionReason {
    /// Highest score among several candidates
    Scored,
    /// Narrowing left exactly one candidate
    OnlyCandidate,
    /// Every tier candidate was already tried
    Fallback,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelectionReason::Scored => "scored",
            SelectionReason::OnlyCandidate => "only-candidate",
            SelectionReason::Fallback => "fallback",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub provider: ProviderId,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub provider: ProviderId,
    pub score: f64,
    pub reason: SelectionReason,
    /// Other surviving candidates, best first.
    pub alternatives: Vec<ScoredCandidate>,
    pub is_fallback: bool,
    /// Priority actually used for scoring, after experiments.
    pub priority: ProcessingPriority,
    pub experiment: Option<String>,
}

/// Scoring-based provider choice. Synchronous and in-memory; no I/O.
pub struct ModelSelector {
    catalog: Arc<ProviderCatalog>,
    performance: Arc<PerformanceTracker>,
    experiments: Arc<ExperimentRegistry>,
    registered: BTreeSet<ProviderId>,
    clock: Arc<dyn Clock>,
}

impl ModelSelector {
    pub fn new(
        catalog: Arc<ProviderCatalog>,
        registered: impl IntoIterator<Item = ProviderId>,
    ) -> Self {
        Self::with_clock(catalog, registered, clock::system())
    }

    pub fn with_clock(
        catalog: Arc<ProviderCatalog>,
        registered: impl IntoIterator<Item = ProviderId>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let performance = Arc::new(PerformanceTracker::with_clock(catalog.clone(), clock.clone()));
        Self {
            catalog,
            performance,
            experiments: Arc::new(ExperimentRegistry::default()),
            registered: registered.into_iter().collect(),
            clock,
        }
    }

    pub fn with_experiments(mut self, experiments: Arc<ExperimentRegistry>) -> Self {
        self.experiments = experiments;
        self
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    pub fn performance(&self) -> &Arc<PerformanceTracker> {
        &self.performance
    }

    pub fn experiments(&self) -> &Arc<ExperimentRegistry> {
        &self.experiments
    }

    /// Registered providers eligible for `tier`, in tier order.
    pub fn eligible(&self, tier: UserTier) -> Vec<ProviderId> {
        self.catalog
            .tier_providers(tier)
            .iter()
            .copied()
            .filter(|p| self.registered.contains(p))
            .collect()
    }

    /// Choose a provider for `criteria`, excluding `tried`.
    ///
    /// Only fails when no registered provider serves the tier at all. When every
    /// eligible provider has been tried, returns the reliable default flagged as a
    /// fallback selection.
    pub fn select(
        &self,
        criteria: &SelectionCriteria,
        tried: &BTreeSet<ProviderId>,
    ) -> Result<Selection> {
        let eligible = self.eligible(criteria.tier);
        if eligible.is_empty() {
            return Err(Error::configuration_with_context(
                format!("no registered provider serves the {} tier", criteria.tier),
                ErrorContext::new()
                    .with_source("model_selector")
                    .with_details(format!("registered: {:?}", self.registered)),
            ));
        }

        let mut candidates: Vec<ProviderId> =
            eligible.iter().copied().filter(|p| !tried.contains(p)).collect();
        if candidates.is_empty() {
            return Ok(self.fallback(criteria, &eligible));
        }

        let (priority, cost_optimize, experiment) = self.apply_experiments(criteria);

        let doc_pref = self.catalog.document_preference(criteria.document_type);
        narrow(&mut candidates, |p| doc_pref.contains(p));
        let complexity_pref = self.catalog.complexity_preference(criteria.complexity);
        narrow(&mut candidates, |p| complexity_pref.contains(p));
        if cost_optimize {
            let ceiling = self.catalog.cost_ceiling(criteria.tier);
            narrow(&mut candidates, |p| {
                self.catalog.estimate_cost(*p, criteria.estimated_tokens) <= ceiling
            });
        }

        let now = self.clock.now();
        let tie_order = self.catalog.tie_break_order(priority);
        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .map(|p| ScoredCandidate {
                provider: *p,
                score: self.score(*p, priority, criteria.document_type, now),
            })
            .collect();
        scored.sort_by(|a, b| {
            if (a.score - b.score).abs() <= SCORE_EPSILON {
                tie_rank(tie_order, a.provider).cmp(&tie_rank(tie_order, b.provider))
            } else {
                b.score.total_cmp(&a.score)
            }
        });

        let winner = scored.remove(0);
        let reason = if scored.is_empty() {
            SelectionReason::OnlyCandidate
        } else {
            SelectionReason::Scored
        };
        debug!(
            provider = %winner.provider,
            score = winner.score,
            tier = %criteria.tier,
            priority = %priority,
            reason = %reason,
            alternatives = scored.len(),
            "provider selected"
        );
        Ok(Selection {
            provider: winner.provider,
            score: winner.score,
            reason,
            alternatives: scored,
            is_fallback: false,
            priority,
            experiment,
        })
    }

    fn fallback(&self, criteria: &SelectionCriteria, eligible: &[ProviderId]) -> Selection {
        let default = self.catalog.reliable_default();
        let provider = if eligible.contains(&default) {
            default
        } else {
            eligible[0]
        };
        warn!(
            provider = %provider,
            tier = %criteria.tier,
            "every eligible provider already tried; falling back to reliable default"
        );
        Selection {
            provider,
            score: 0.0,
            reason: SelectionReason::Fallback,
            alternatives: Vec::new(),
            is_fallback: true,
            priority: criteria.priority,
            experiment: None,
        }
    }

    fn apply_experiments(
        &self,
        criteria: &SelectionCriteria,
    ) -> (ProcessingPriority, bool, Option<String>) {
        let mut priority = criteria.priority;
        let mut cost_optimize = criteria.cost_optimize;
        let Some(requester) = criteria.requester_id.as_deref() else {
            return (priority, cost_optimize, None);
        };
        let Some((id, variant)) = self.experiments.variant_for(requester, criteria.tier) else {
            return (priority, cost_optimize, None);
        };
        if let Some(flag) = variant.cost_optimize {
            cost_optimize = flag;
        }
        if let Some(bias) = variant.priority_bias {
            if !criteria.explicit_priority {
                priority = bias;
            }
        }
        debug!(
            experiment = %id,
            requester,
            priority = %priority,
            cost_optimize,
            "experiment variant applied"
        );
        (priority, cost_optimize, Some(id))
    }

    /// Weighted score; see the scoring table in the [routing module docs](super).
    pub fn score(
        &self,
        provider: ProviderId,
        priority: ProcessingPriority,
        document_type: DocumentType,
        now: Instant,
    ) -> f64 {
        let perf = self.performance.get(provider);
        let latency_weight = match priority {
            ProcessingPriority::Speed => 40.0,
            ProcessingPriority::Balanced => 30.0,
            ProcessingPriority::Quality => 20.0,
        };
        let success = perf.success_rate.clamp(0.0, 1.0) * 40.0;
        let latency =
            (1.0 - perf.avg_latency_ms / LATENCY_SCALE_MS).clamp(0.0, 1.0) * latency_weight;
        let cost = (1.0 - perf.avg_cost / COST_SCALE_USD).clamp(0.0, 1.0) * 20.0;
        let idle = match perf.last_used {
            None => 1.0,
            Some(t) => {
                let since = now.saturating_duration_since(t).as_secs_f64();
                (since / RECENCY_SCALE.as_secs_f64()).min(1.0)
            }
        };
        let base = success + latency + cost + idle * 10.0;
        base * (1.0 + affinity_bonus(self.catalog.document_preference(document_type), provider))
    }
}

/// Keep only candidates matching `keep`, unless that would leave none.
fn narrow(candidates: &mut Vec<ProviderId>, keep: impl Fn(&ProviderId) -> bool) {
    if candidates.iter().any(&keep) {
        candidates.retain(|p| keep(p));
    }
}

/// Up to 30% for the top preference, decreasing linearly with rank.
fn affinity_bonus(preference: &[ProviderId], provider: ProviderId) -> f64 {
    match preference.iter().position(|p| *p == provider) {
        Some(rank) => MAX_AFFINITY_BONUS * (1.0 - rank as f64 / preference.len() as f64),
        None => 0.0,
    }
}

fn tie_rank(order: &[ProviderId], provider: ProviderId) -> usize {
    order
        .iter()
        .position(|p| *p == provider)
        .unwrap_or(usize::MAX)
}
