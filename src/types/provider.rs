//! Identity and classification enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Remote model identity. Immutable; every per-provider map is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderId {
    ClaudeSonnet,
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    GeminiPro,
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::ClaudeSonnet,
        ProviderId::Gpt4o,
        ProviderId::GeminiPro,
        ProviderId::Gpt4oMini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::ClaudeSonnet => "claude-sonnet",
            ProviderId::Gpt4o => "gpt-4o",
            ProviderId::GeminiPro => "gemini-pro",
            ProviderId::Gpt4oMini => "gpt-4o-mini",
        }
    }

    /// Environment variable holding the provider credential unless the config overrides it.
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ProviderId::ClaudeSonnet => "ANTHROPIC_API_KEY",
            ProviderId::Gpt4o | ProviderId::Gpt4oMini => "OPENAI_API_KEY",
            ProviderId::GeminiPro => "GEMINI_API_KEY",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        ProviderId::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                crate::Error::validation_with_context(
                    format!("unknown provider '{}'", s),
                    crate::ErrorContext::new().with_source("provider_id"),
                )
            })
    }
}

/// Subscription level of the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    Free,
    Basic,
    Pro,
    Premium,
}

impl UserTier {
    pub const ALL: [UserTier; 4] = [
        UserTier::Free,
        UserTier::Basic,
        UserTier::Pro,
        UserTier::Premium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserTier::Free => "free",
            UserTier::Basic => "basic",
            UserTier::Pro => "pro",
            UserTier::Premium => "premium",
        }
    }
}

impl fmt::Display for UserTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of document being enhanced. Unknown names map to [`DocumentType::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    Resume,
    CoverLetter,
    Presentation,
    Marketing,
    Report,
    Academic,
    #[serde(other)]
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Resume => "resume",
            DocumentType::CoverLetter => "cover-letter",
            DocumentType::Presentation => "presentation",
            DocumentType::Marketing => "marketing",
            DocumentType::Report => "report",
            DocumentType::Academic => "academic",
            DocumentType::Other => "other",
        }
    }

    /// Multiplier applied last in complexity estimation.
    pub fn complexity_multiplier(&self) -> f64 {
        match self {
            DocumentType::Presentation => 1.2,
            DocumentType::Marketing => 1.3,
            _ => 1.0,
        }
    }
}

impl From<&str> for DocumentType {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "resume" | "cv" => DocumentType::Resume,
            "cover-letter" => DocumentType::CoverLetter,
            "presentation" | "slides" => DocumentType::Presentation,
            "marketing" | "flyer" | "brochure" => DocumentType::Marketing,
            "report" => DocumentType::Report,
            "academic" | "paper" => DocumentType::Academic,
            _ => DocumentType::Other,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the requester cares about most for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingPriority {
    Speed,
    #[default]
    Balanced,
    Quality,
}

impl fmt::Display for ProcessingPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcessingPriority::Speed => "speed",
            ProcessingPriority::Balanced => "balanced",
            ProcessingPriority::Quality => "quality",
        })
    }
}

/// Estimated difficulty of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        })
    }
}
