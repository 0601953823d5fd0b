//! 结果缓存模块：为降级响应提供历史分析结果的查询接口。
//!
//! # Analysis Cache Module
//!
//! Recent live results kept so that a degraded response can reuse a similar
//! document's analysis instead of a static template.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheLookup`] | Query interface consumed by the fallback chain |
//! | [`InMemoryAnalysisCache`] | LRU store with per-entry TTL and hit statistics |
//! | [`NullCacheLookup`] | Lookup that never finds anything |
//!
//! ## Example
//!
//! ```rust
//! use doc_enhance_core::cache::InMemoryAnalysisCache;
//! use std::time::Duration;
//!
//! // Keep up to 500 results for one hour
//! let cache = InMemoryAnalysisCache::new(500, Duration::from_secs(3600));
//! assert!(cache.is_empty());
//! ```

mod lookup;
mod memory;

pub use lookup::{CacheLookup, CachedAnalysis, NullCacheLookup, SimilarDocument};
pub use memory::{CacheStats, InMemoryAnalysisCache};
