//! A/B experiments that adjust routing inputs for enrolled requesters.
//!
//! The active set is swapped atomically; readers never block writers.

use crate::types::{ProcessingPriority, UserTier};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// What an enrolled requester gets instead of the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentVariant {
    /// Forces the cost-optimisation flag on or off.
    #[serde(default)]
    pub cost_optimize: Option<bool>,
    /// Biases an inferred priority; an explicit user preference still wins.
    #[serde(default)]
    pub priority_bias: Option<ProcessingPriority>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub tiers: Vec<UserTier>,
    /// Share of requesters enrolled, 0-100.
    pub enrollment_percent: u8,
    #[serde(default = "default_active")]
    pub active: bool,
    pub variant: ExperimentVariant,
}

fn default_active() -> bool {
    true
}

impl Experiment {
    pub fn new(id: impl Into<String>, variant: ExperimentVariant) -> Self {
        Self {
            id: id.into(),
            tiers: UserTier::ALL.to_vec(),
            enrollment_percent: 100,
            active: true,
            variant,
        }
    }

    pub fn with_tiers(mut self, tiers: Vec<UserTier>) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn with_enrollment_percent(mut self, percent: u8) -> Self {
        self.enrollment_percent = percent.min(100);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Deterministic: the same requester always lands in the same bucket.
    pub fn enrolls(&self, requester_id: &str, tier: UserTier) -> bool {
        self.active
            && self.tiers.contains(&tier)
            && bucket(&self.id, requester_id) < self.enrollment_percent as u32
    }
}

/// 0..100 bucket from SHA-256 of `experiment:requester`.
fn bucket(experiment_id: &str, requester_id: &str) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(experiment_id.as_bytes());
    hasher.update(b":");
    hasher.update(requester_id.as_bytes());
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 100
}

/// Hot-swappable experiment set.
pub struct ExperimentRegistry {
    experiments: ArcSwap<Vec<Experiment>>,
}

impl Default for ExperimentRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ExperimentRegistry {
    pub fn new(experiments: Vec<Experiment>) -> Self {
        Self {
            experiments: ArcSwap::from_pointee(experiments),
        }
    }

    pub fn replace(&self, experiments: Vec<Experiment>) {
        self.experiments.store(Arc::new(experiments));
    }

    pub fn list(&self) -> Arc<Vec<Experiment>> {
        self.experiments.load_full()
    }

    /// First active experiment enrolling this requester, in registration order.
    pub fn variant_for(
        &self,
        requester_id: &str,
        tier: UserTier,
    ) -> Option<(String, ExperimentVariant)> {
        let experiments = self.experiments.load();
        experiments
            .iter()
            .find(|e| e.enrolls(requester_id, tier))
            .map(|e| (e.id.clone(), e.variant.clone()))
    }
}
