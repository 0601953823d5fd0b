use crate::types::ProviderId;
use std::time::Duration;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "providers.gpt-4o.api_key_env")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected value, upstream id)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "model_selector")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Unified error type for the enhancement core.
///
/// Open breakers, unhealthy providers and low scores are control-flow signals inside the
/// core; they only surface here when a caller asks for them explicitly (e.g. running an
/// operation through a breaker directly).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    /// Transient provider failure (network, 5xx, malformed reply).
    #[error("Provider {provider} failed: {message}")]
    Provider {
        provider: ProviderId,
        message: String,
        status: Option<u16>,
    },

    /// Provider-side or local throttling. Never counted as a breaker failure.
    #[error("Provider {provider} rate limited: {message}")]
    RateLimited {
        provider: ProviderId,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Circuit breaker open for {provider}")]
    CircuitOpen { provider: ProviderId },

    #[error("Provider {provider} timed out after {}ms", .elapsed.as_millis())]
    Timeout {
        provider: ProviderId,
        elapsed: Duration,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Transient failure reported by (or about) a provider.
    pub fn provider(provider: ProviderId, msg: impl Into<String>) -> Self {
        Error::Provider {
            provider,
            message: msg.into(),
            status: None,
        }
    }

    pub fn rate_limited(
        provider: ProviderId,
        msg: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        Error::RateLimited {
            provider,
            message: msg.into(),
            retry_after,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Provider the error is attributed to, if any.
    pub fn provider_id(&self) -> Option<ProviderId> {
        match self {
            Error::Provider { provider, .. }
            | Error::RateLimited { provider, .. }
            | Error::CircuitOpen { provider }
            | Error::Timeout { provider, .. } => Some(*provider),
            _ => None,
        }
    }

    /// Throttling, either typed or recognised from the message text.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Error::RateLimited { .. } => true,
            Error::Provider { status, .. } if *status == Some(429) => true,
            Error::Provider { message, .. } | Error::Runtime { message, .. } => {
                crate::resilience::classification::is_rate_limit_message(message)
            }
            _ => false,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Error::CircuitOpen { .. })
    }

    /// Failures worth retrying against a different provider.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Provider { status, .. } => status.map_or(true, |s| s >= 500 || s == 429),
            Error::Timeout { .. } | Error::RateLimited { .. } => true,
            _ => false,
        }
    }

    /// Retry-after hint carried by throttling errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let err = Error::configuration_with_context(
            "missing credential",
            ErrorContext::new()
                .with_field_path("providers.gpt-4o.api_key_env")
                .with_source("config_loader"),
        );
        let text = err.to_string();
        assert!(text.contains("missing credential"));
        assert!(text.contains("field: providers.gpt-4o.api_key_env"));
        assert!(text.contains("source: config_loader"));
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(Error::rate_limited(ProviderId::Gpt4o, "slow down", None).is_rate_limited());
        assert!(Error::provider(ProviderId::Gpt4o, "HTTP 429 from upstream").is_rate_limited());
        assert!(Error::provider(ProviderId::Gpt4o, "Too Many Requests").is_rate_limited());
        assert!(!Error::provider(ProviderId::Gpt4o, "connection reset").is_rate_limited());
        assert!(!Error::CircuitOpen {
            provider: ProviderId::Gpt4o
        }
        .is_rate_limited());
    }

    #[test]
    fn test_provider_attribution() {
        let err = Error::Timeout {
            provider: ProviderId::GeminiPro,
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(err.provider_id(), Some(ProviderId::GeminiPro));
        assert!(err.is_transient());
        assert!(err.to_string().contains("1500ms"));
    }
}
