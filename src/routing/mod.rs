//! 路由模块：按等级、文档类型、复杂度和历史表现为每个请求选择供应商。
//!
//! # Routing Module
//!
//! Pure selection logic. Nothing here performs network calls; the service feeds
//! call outcomes back through [`PerformanceTracker`].
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`catalog`] | Tier lists, preferences, pricing, cost ceilings and tie-break orders |
//! | [`complexity`] | Complexity estimation and processing-priority inference |
//! | [`performance`] | EMA of latency, success rate and cost per provider |
//! | [`experiments`] | Deterministically bucketed routing experiments |
//! | [`selector`] | Candidate narrowing and weighted scoring |
//!
//! ## Scoring
//!
//! | Term | Weight |
//! |------|--------|
//! | success rate | 40 |
//! | `1 - latency / 20s` | 30 (40 for speed, 20 for quality) |
//! | `1 - cost / $0.05` | 20 |
//! | time since last use, linear over one week | 10 |
//!
//! The sum is multiplied by up to 1.3 for providers ranked high in the
//! document type's preference list.

pub mod catalog;
pub mod complexity;
pub mod experiments;
pub mod performance;
pub mod selector;

pub use catalog::{ProviderCatalog, ProviderProfile, DEFAULT_ESTIMATED_TOKENS};
pub use complexity::{complexity_score, determine_complexity_with_context, infer_priority};
pub use experiments::{Experiment, ExperimentRegistry, ExperimentVariant};
pub use performance::{PerformanceRecord, PerformanceTracker, EMA_ALPHA};
pub use selector::{ModelSelector, ScoredCandidate, Selection, SelectionCriteria, SelectionReason};
