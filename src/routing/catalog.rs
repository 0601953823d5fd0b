//! Static routing tables: which providers each tier may use, which ones suit a
//! document type or difficulty, and what they cost.

use crate::types::{Complexity, DocumentType, ProcessingPriority, ProviderId, UserTier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Tokens assumed for a request that carries no estimate.
pub const DEFAULT_ESTIMATED_TOKENS: u32 = 2_000;

/// Pricing and prior performance for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub provider: ProviderId,
    pub display_name: String,
    /// Blended USD per 1k tokens.
    pub cost_per_1k_tokens: f64,
    /// Latency assumed before any real call has been measured.
    pub prior_latency: Duration,
    pub prior_success_rate: f64,
}

impl ProviderProfile {
    pub fn new(provider: ProviderId, display_name: &str) -> Self {
        Self {
            provider,
            display_name: display_name.to_string(),
            cost_per_1k_tokens: 0.0,
            prior_latency: Duration::from_secs(3),
            prior_success_rate: 0.95,
        }
    }

    pub fn with_cost_per_1k(mut self, cost: f64) -> Self {
        self.cost_per_1k_tokens = cost.max(0.0);
        self
    }

    pub fn with_prior_latency(mut self, latency: Duration) -> Self {
        self.prior_latency = latency;
        self
    }

    pub fn with_prior_success_rate(mut self, rate: f64) -> Self {
        self.prior_success_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn estimate_cost(&self, tokens: u32) -> f64 {
        (tokens as f64 / 1000.0) * self.cost_per_1k_tokens
    }
}

/// Routing tables consulted by [`ModelSelector`](super::ModelSelector).
#[derive(Debug, Clone)]
pub struct ProviderCatalog {
    profiles: HashMap<ProviderId, ProviderProfile>,
    tiers: HashMap<UserTier, Vec<ProviderId>>,
    document_preferences: HashMap<DocumentType, Vec<ProviderId>>,
    complexity_preferences: HashMap<Complexity, Vec<ProviderId>>,
    cost_ceilings: HashMap<UserTier, f64>,
    tie_breaks: HashMap<ProcessingPriority, Vec<ProviderId>>,
    reliable_default: ProviderId,
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        use ProviderId::*;

        let profiles = [
            ProviderProfile::new(ClaudeSonnet, "Claude Sonnet")
                .with_cost_per_1k(0.009)
                .with_prior_latency(Duration::from_millis(4_000))
                .with_prior_success_rate(0.97),
            ProviderProfile::new(Gpt4o, "GPT-4o")
                .with_cost_per_1k(0.0075)
                .with_prior_latency(Duration::from_millis(3_500))
                .with_prior_success_rate(0.96),
            ProviderProfile::new(GeminiPro, "Gemini Pro")
                .with_cost_per_1k(0.00125)
                .with_prior_latency(Duration::from_millis(2_500))
                .with_prior_success_rate(0.94),
            ProviderProfile::new(Gpt4oMini, "GPT-4o mini")
                .with_cost_per_1k(0.0003)
                .with_prior_latency(Duration::from_millis(1_500))
                .with_prior_success_rate(0.98),
        ]
        .into_iter()
        .map(|p| (p.provider, p))
        .collect();

        let tiers = [
            (UserTier::Free, vec![Gpt4oMini]),
            (UserTier::Basic, vec![GeminiPro, Gpt4oMini]),
            (UserTier::Pro, vec![ClaudeSonnet, GeminiPro, Gpt4oMini]),
            (UserTier::Premium, vec![ClaudeSonnet, Gpt4o, GeminiPro, Gpt4oMini]),
        ]
        .into_iter()
        .collect();

        let document_preferences = [
            (DocumentType::Resume, vec![ClaudeSonnet, Gpt4o, GeminiPro]),
            (DocumentType::CoverLetter, vec![ClaudeSonnet, Gpt4o]),
            (DocumentType::Presentation, vec![Gpt4o, GeminiPro, ClaudeSonnet]),
            (DocumentType::Marketing, vec![Gpt4o, ClaudeSonnet]),
            (DocumentType::Report, vec![ClaudeSonnet, GeminiPro]),
            (DocumentType::Academic, vec![ClaudeSonnet, Gpt4o]),
        ]
        .into_iter()
        .collect();

        let complexity_preferences = [
            (Complexity::Low, vec![Gpt4oMini, GeminiPro]),
            (Complexity::Medium, vec![GeminiPro, Gpt4o, ClaudeSonnet]),
            (Complexity::High, vec![ClaudeSonnet, Gpt4o]),
        ]
        .into_iter()
        .collect();

        let cost_ceilings = [
            (UserTier::Free, 0.002),
            (UserTier::Basic, 0.01),
            (UserTier::Pro, 0.03),
            (UserTier::Premium, 0.10),
        ]
        .into_iter()
        .collect();

        let tie_breaks = [
            (
                ProcessingPriority::Speed,
                vec![Gpt4oMini, GeminiPro, Gpt4o, ClaudeSonnet],
            ),
            (
                ProcessingPriority::Balanced,
                vec![Gpt4o, ClaudeSonnet, GeminiPro, Gpt4oMini],
            ),
            (
                ProcessingPriority::Quality,
                vec![ClaudeSonnet, Gpt4o, GeminiPro, Gpt4oMini],
            ),
        ]
        .into_iter()
        .collect();

        Self {
            profiles,
            tiers,
            document_preferences,
            complexity_preferences,
            cost_ceilings,
            tie_breaks,
            reliable_default: Gpt4oMini,
        }
    }
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, profile: ProviderProfile) -> Self {
        self.profiles.insert(profile.provider, profile);
        self
    }

    /// Replace the cost of one provider, keeping its other priors.
    pub fn with_cost(mut self, provider: ProviderId, cost_per_1k: f64) -> Self {
        let profile = self
            .profiles
            .entry(provider)
            .or_insert_with(|| ProviderProfile::new(provider, provider.as_str()));
        profile.cost_per_1k_tokens = cost_per_1k.max(0.0);
        self
    }

    pub fn with_tier(mut self, tier: UserTier, providers: Vec<ProviderId>) -> Self {
        self.tiers.insert(tier, dedup(providers));
        self
    }

    pub fn with_document_preference(
        mut self,
        doc: DocumentType,
        providers: Vec<ProviderId>,
    ) -> Self {
        self.document_preferences.insert(doc, dedup(providers));
        self
    }

    pub fn with_complexity_preference(
        mut self,
        complexity: Complexity,
        providers: Vec<ProviderId>,
    ) -> Self {
        self.complexity_preferences.insert(complexity, dedup(providers));
        self
    }

    pub fn with_cost_ceiling(mut self, tier: UserTier, usd: f64) -> Self {
        self.cost_ceilings.insert(tier, usd.max(0.0));
        self
    }

    pub fn with_reliable_default(mut self, provider: ProviderId) -> Self {
        self.reliable_default = provider;
        self
    }

    pub fn profile(&self, provider: ProviderId) -> Option<&ProviderProfile> {
        self.profiles.get(&provider)
    }

    /// Eligible providers for a tier, most capable first.
    pub fn tier_providers(&self, tier: UserTier) -> &[ProviderId] {
        self.tiers.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn document_preference(&self, doc: DocumentType) -> &[ProviderId] {
        self.document_preferences
            .get(&doc)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn complexity_preference(&self, complexity: Complexity) -> &[ProviderId] {
        self.complexity_preferences
            .get(&complexity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Maximum estimated cost per request; tiers without a ceiling are unbounded.
    pub fn cost_ceiling(&self, tier: UserTier) -> f64 {
        self.cost_ceilings.get(&tier).copied().unwrap_or(f64::INFINITY)
    }

    pub fn tie_break_order(&self, priority: ProcessingPriority) -> &[ProviderId] {
        self.tie_breaks
            .get(&priority)
            .map(Vec::as_slice)
            .unwrap_or(&ProviderId::ALL)
    }

    pub fn reliable_default(&self) -> ProviderId {
        self.reliable_default
    }

    pub fn estimate_cost(&self, provider: ProviderId, tokens: u32) -> f64 {
        self.profile(provider)
            .map(|p| p.estimate_cost(tokens))
            .unwrap_or(0.0)
    }
}

fn dedup(providers: Vec<ProviderId>) -> Vec<ProviderId> {
    let mut out: Vec<ProviderId> = Vec::with_capacity(providers.len());
    for p in providers {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_lists_grow_with_tier() {
        let catalog = ProviderCatalog::default();
        assert_eq!(catalog.tier_providers(UserTier::Free), &[ProviderId::Gpt4oMini]);
        assert_eq!(catalog.tier_providers(UserTier::Premium).len(), 4);
        assert_eq!(
            catalog.tier_providers(UserTier::Premium)[0],
            ProviderId::ClaudeSonnet
        );
        for tier in UserTier::ALL {
            assert!(catalog
                .tier_providers(tier)
                .contains(&catalog.reliable_default()));
        }
    }

    #[test]
    fn test_cost_estimate() {
        let catalog = ProviderCatalog::default().with_cost(ProviderId::GeminiPro, 0.002);
        assert!((catalog.estimate_cost(ProviderId::GeminiPro, 1_500) - 0.003).abs() < 1e-12);
        assert_eq!(
            catalog.profile(ProviderId::GeminiPro).unwrap().prior_success_rate,
            0.94
        );
    }

    #[test]
    fn test_unknown_document_type_has_no_preference() {
        let catalog = ProviderCatalog::default();
        assert!(catalog.document_preference(DocumentType::Other).is_empty());
        let custom = catalog.with_tier(
            UserTier::Free,
            vec![ProviderId::Gpt4oMini, ProviderId::Gpt4oMini],
        );
        assert_eq!(custom.tier_providers(UserTier::Free).len(), 1);
    }
}
