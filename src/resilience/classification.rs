//! Error classification logic

use once_cell::sync::Lazy;
use regex::Regex;

static RATE_LIMIT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)rate[\s_-]?limit|\b429\b|too many requests|quota exceeded")
        .expect("static rate-limit pattern")
});

/// Whether an error message describes provider-side throttling.
///
/// Throttling says nothing about provider health, so breakers must not count it:
/// - "rate limit" / "rate_limited" / "Rate-Limit"
/// - HTTP 429
/// - "too many requests"
pub(crate) fn is_rate_limit_message(message: &str) -> bool {
    RATE_LIMIT_PATTERN.is_match(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_messages() {
        for msg in [
            "rate limit exceeded",
            "error: rate_limited",
            "HTTP 429",
            "Too Many Requests",
            "monthly quota exceeded",
        ] {
            assert!(is_rate_limit_message(msg), "'{}' should be rate limit", msg);
        }
    }

    #[test]
    fn test_other_messages() {
        for msg in [
            "connection refused",
            "HTTP 503 service unavailable",
            "request 14290 failed",
            "timeout",
        ] {
            assert!(!is_rate_limit_message(msg), "'{}' should not be rate limit", msg);
        }
    }
}
