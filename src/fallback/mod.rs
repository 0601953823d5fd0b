//! 降级策略模块：所有供应商不可用时按优先级生成降级响应。
//!
//! # Fallback Module
//!
//! Ordered, pluggable strategies that answer a request without a live provider.
//! The chain never fails: when every strategy declines or errors, a terminal
//! "service unavailable" response is returned.
//!
//! | Strategy | Priority | Eligible | Source |
//! |----------|----------|----------|--------|
//! | [`CachedResultStrategy`] | 100 | premium only | `cache` |
//! | [`TemplateStrategy`] | 80 | always | `template` |
//! | [`RuleBasedStrategy`] | 60 | all but free | `basic-ai` |
//! | [`GracefulDegradationStrategy`] | 0 | always | `none` |

mod chain;
mod strategies;
mod strategy;

pub use chain::{FallbackChain, TERMINAL_MESSAGE};
pub use strategies::{
    CachedResultStrategy, GracefulDegradationStrategy, RuleBasedStrategy, TemplateStrategy,
};
pub use strategy::{FallbackContext, FallbackStrategy};
