//! # doc-enhance-core
//!
//! 文档增强请求的供应商弹性与路由核心：熔断、健康探测、模型评分选择与降级兜底。
//!
//! Provider resilience and routing core for document-enhancement AI requests.
//!
//! ## Overview
//!
//! A request to enhance a document is routed to one of several remote models. This
//! crate decides which one, keeps misbehaving models out of the path, and guarantees
//! the caller an answer: a live result, a clearly marked degraded result, or a single
//! error once the attempt budget is spent.
//!
//! ## Core Philosophy
//!
//! - **Isolation per provider**: every model has its own breaker, health record and
//!   performance record; one bad model never drags the others down
//! - **Signals, not exceptions**: open breakers, unhealthy providers and low scores are
//!   control flow inside the core
//! - **Bounded work**: a fixed number of distinct-provider attempts, explicit timeouts on
//!   every outbound call, and cancelable background probes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc_enhance_core::{EnhancementService, ServiceConfig};
//! use doc_enhance_core::types::{DocumentRef, DocumentType, RequestContext, UserTier};
//! # use doc_enhance_core::provider::ProviderClient;
//! # use std::sync::Arc;
//! # async fn run(openai_mini: Arc<dyn ProviderClient>) -> doc_enhance_core::Result<()> {
//! let service = EnhancementService::builder()
//!     .with_config(ServiceConfig::new().with_env_overrides())
//!     .with_provider(openai_mini)
//!     .build()?;
//! service.start_health_monitoring();
//!
//! let document = DocumentRef::new("doc-1", DocumentType::Resume);
//! let ctx = RequestContext::new(UserTier::Free, DocumentType::Resume);
//! let result = service.analyze_document(&document, &ctx, "user-7").await?;
//! if result.degraded {
//!     println!("{}", result.message.unwrap_or_default());
//! }
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`service`] | End-to-end orchestration of one request |
//! | [`routing`] | Provider catalog, complexity estimation, scoring and experiments |
//! | [`resilience`] | Per-provider circuit breakers and the rate-limiter interface |
//! | [`health`] | Periodic probes and health classification |
//! | [`fallback`] | Prioritised degraded-response strategies |
//! | [`cache`] | Recent results reused by the fallback chain |
//! | [`provider`] | Provider client interface and registry |
//! | [`telemetry`] | Selection audit sinks |
//! | [`usage`] | Cost tracking interface |
//! | [`config`] | YAML configuration, environment overrides, validation |
//! | [`types`] | Domain types |
//! | [`clock`] | Injectable time source |

pub mod cache;
pub mod clock;
pub mod config;
pub mod fallback;
pub mod health;
pub mod provider;
pub mod resilience;
pub mod routing;
pub mod service;
pub mod telemetry;
pub mod types;
pub mod usage;

// Re-export main types for convenience
pub use config::{ConfigReport, ServiceConfig};
pub use fallback::{FallbackChain, FallbackStrategy};
pub use health::{HealthMonitor, HealthStatus};
pub use provider::{ProviderClient, ProviderRegistry};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimiter};
pub use routing::{ModelSelector, Selection, SelectionCriteria};
pub use service::{EnhancementService, EnhancementServiceBuilder, ProviderStatus};
pub use telemetry::{SelectionEvent, SelectionSink};
pub use types::{EnhancementResult, ProviderId};
pub use usage::CostTracker;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
