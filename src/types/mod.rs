//! 类型系统模块：定义路由核心使用的领域类型。
//!
//! # Types Module
//!
//! Strongly-typed representations of everything that flows through the routing core:
//! provider identities, request context, provider replies and the final enhancement
//! result (live or degraded).
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ProviderId`] | Identity of a remote model; key for all per-provider state |
//! | [`UserTier`] | Subscription level bounding eligible providers |
//! | [`RequestContext`] | Per-request routing inputs |
//! | [`ProviderReply`] | Raw outcome of one provider call |
//! | [`GenerationResponse`] | Provider or fallback output tagged with its source |
//! | [`EnhancementResult`] | What the request layer receives |
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`provider`] | Identity and classification enums |
//! | [`request`] | Document references and request context |
//! | [`response`] | Replies, usage, analysis and results |

pub mod provider;
pub mod request;
pub mod response;

pub use provider::{Complexity, DocumentType, ProcessingPriority, ProviderId, UserTier};
pub use request::{DocumentRef, DocumentSignals, RequestContext};
pub use response::{
    DocumentAnalysis, EnhancementPlan, EnhancementResult, EnhancementSuggestion,
    GenerationResponse, ProviderReply, ResponseSource, SuggestionImpact, Usage,
};
