//! 弹性模式模块：提供按供应商隔离的熔断器和限流器。
//!
//! # Resilience Primitives Module
//!
//! Failure isolation for remote providers. Every provider gets its own breaker so a
//! misbehaving model never drags the others down.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Windowed circuit breaker with half-open trials and event fan-out |
//! | [`registry`] | One breaker per provider, injected into the service |
//! | [`rate_limiter`] | Quota gate interface plus an in-process token bucket |
//! | [`classification`] | Recognises throttling errors that must not trip breakers |
//!
//! ## Circuit Breaker
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Failures exceeded threshold, requests fail fast
//! - **Half-Open**: A bounded number of trial requests test recovery
//!
//! ```rust
//! use doc_enhance_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use doc_enhance_core::types::ProviderId;
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(5)
//!     .with_reset_timeout(Duration::from_secs(30));
//! let breaker = CircuitBreaker::new(ProviderId::Gpt4o, config);
//!
//! if breaker.can_proceed() {
//!     // Make the provider call via breaker.execute(...)
//! }
//! ```

pub(crate) mod classification;
pub mod circuit_breaker;
pub mod rate_limiter;
pub mod registry;

pub use circuit_breaker::{
    BreakerEvent, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState,
};
pub use rate_limiter::{
    AllowAllRateLimiter, RateLimitDecision, RateLimiter, RateLimiterConfig,
    TokenBucketRateLimiter,
};
pub use registry::BreakerRegistry;
