//! 用量记录模块：成功调用后的 token 与费用记录接口。
//!
//! Cost tracking for successful provider calls. Tracking is fire-and-forget:
//! implementations swallow their own failures and persistence strategy is theirs.

use crate::types::{DocumentRef, ProviderId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;

#[async_trait]
pub trait CostTracker: Send + Sync {
    async fn track_usage(
        &self,
        provider: ProviderId,
        requester_id: &str,
        document: &DocumentRef,
        tokens: u32,
        cost: f64,
    );
}

pub struct NoopCostTracker;

#[async_trait]
impl CostTracker for NoopCostTracker {
    async fn track_usage(&self, _: ProviderId, _: &str, _: &DocumentRef, _: u32, _: f64) {}
}

/// Accumulated usage for one key.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct UsageTotals {
    pub requests: u64,
    pub tokens: u64,
    /// USD.
    pub cost: f64,
}

impl UsageTotals {
    fn add(&mut self, tokens: u32, cost: f64) {
        self.requests += 1;
        self.tokens += u64::from(tokens);
        if cost.is_finite() && cost > 0.0 {
            self.cost += cost;
        }
    }

    pub fn format(&self) -> String {
        format!("{} requests, {} tokens, ${:.4}", self.requests, self.tokens, self.cost)
    }
}

/// Per-provider and per-requester totals kept in memory.
#[derive(Default)]
pub struct InMemoryCostTracker {
    by_provider: DashMap<ProviderId, UsageTotals>,
    by_requester: DashMap<String, UsageTotals>,
}

impl InMemoryCostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider_totals(&self, provider: ProviderId) -> UsageTotals {
        self.by_provider
            .get(&provider)
            .map(|t| *t)
            .unwrap_or_default()
    }

    pub fn requester_totals(&self, requester_id: &str) -> UsageTotals {
        self.by_requester
            .get(requester_id)
            .map(|t| *t)
            .unwrap_or_default()
    }

    pub fn total(&self) -> UsageTotals {
        self.by_provider
            .iter()
            .fold(UsageTotals::default(), |mut acc, t| {
                acc.requests += t.requests;
                acc.tokens += t.tokens;
                acc.cost += t.cost;
                acc
            })
    }
}

#[async_trait]
impl CostTracker for InMemoryCostTracker {
    async fn track_usage(
        &self,
        provider: ProviderId,
        requester_id: &str,
        _document: &DocumentRef,
        tokens: u32,
        cost: f64,
    ) {
        self.by_provider.entry(provider).or_default().add(tokens, cost);
        self.by_requester
            .entry(requester_id.to_string())
            .or_default()
            .add(tokens, cost);
    }
}
