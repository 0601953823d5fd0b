//! Service configuration: YAML file, `DOC_ENHANCE_*` environment overrides, validation.
//!
//! Durations are written in milliseconds (`*_ms` keys) in YAML:
//!
//! ```yaml
//! max_attempts: 3
//! provider_timeout_ms: 30000
//! default_provider: gpt-4o-mini
//! breaker:
//!   failure_threshold: 5
//!   reset_timeout_ms: 60000
//! breaker_overrides:
//!   gemini-pro:
//!     failure_threshold: 3
//! health:
//!   interval_ms: 30000
//! providers:
//!   claude-sonnet:
//!     api_key_env: ANTHROPIC_API_KEY
//! ```

use crate::health::HealthConfig;
use crate::resilience::CircuitBreakerConfig;
use crate::types::ProviderId;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

/// Serde adapter for `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

const ENV_PREFIX: &str = "DOC_ENHANCE_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Variable holding the credential; `None` means the provider's conventional name.
    pub api_key_env: Option<String>,
    pub enabled: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key_env: None,
            enabled: true,
        }
    }
}

impl ProviderSettings {
    pub fn key_env(&self, provider: ProviderId) -> String {
        self.api_key_env
            .clone()
            .unwrap_or_else(|| provider.default_api_key_env().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Distinct-provider attempts per request.
    pub max_attempts: u32,
    #[serde(with = "duration_ms", rename = "provider_timeout_ms")]
    pub provider_timeout: Duration,
    /// Provider used when every tier candidate has already been tried.
    pub default_provider: ProviderId,
    pub breaker: CircuitBreakerConfig,
    pub breaker_overrides: HashMap<ProviderId, CircuitBreakerConfig>,
    pub health: HealthConfig,
    pub providers: BTreeMap<ProviderId, ProviderSettings>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            provider_timeout: Duration::from_secs(30),
            default_provider: ProviderId::Gpt4oMini,
            breaker: CircuitBreakerConfig::default(),
            breaker_overrides: HashMap::new(),
            health: HealthConfig::default(),
            providers: ProviderId::ALL
                .iter()
                .map(|p| (*p, ProviderSettings::default()))
                .collect(),
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config: {}", e),
                ErrorContext::new().with_field_path(path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_default_provider(mut self, provider: ProviderId) -> Self {
        self.default_provider = provider;
        self
    }

    pub fn with_breaker(mut self, cfg: CircuitBreakerConfig) -> Self {
        self.breaker = cfg;
        self
    }

    pub fn with_breaker_override(
        mut self,
        provider: ProviderId,
        cfg: CircuitBreakerConfig,
    ) -> Self {
        self.breaker_overrides.insert(provider, cfg);
        self
    }

    pub fn with_health(mut self, cfg: HealthConfig) -> Self {
        self.health = cfg;
        self
    }

    /// Apply `DOC_ENHANCE_*` variables from the process environment.
    ///
    /// - `DOC_ENHANCE_MAX_ATTEMPTS`
    /// - `DOC_ENHANCE_PROVIDER_TIMEOUT_MS`
    /// - `DOC_ENHANCE_DEFAULT_PROVIDER`
    /// - `DOC_ENHANCE_BREAKER_FAILURE_THRESHOLD`
    /// - `DOC_ENHANCE_BREAKER_RESET_TIMEOUT_MS`
    /// - `DOC_ENHANCE_HEALTH_INTERVAL_MS`
    /// - `DOC_ENHANCE_HEALTH_PROBE_TIMEOUT_MS`
    ///
    /// Unparseable values are ignored with a warning.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            suffix: &str,
        ) -> Option<T> {
            let key = format!("{}{}", ENV_PREFIX, suffix);
            let raw = lookup(&key)?;
            match raw.trim().parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(key = %key, value = %raw, "ignoring unparseable override");
                    None
                }
            }
        }

        if let Some(n) = parsed::<u32>(&lookup, "MAX_ATTEMPTS") {
            self.max_attempts = n.max(1);
        }
        if let Some(ms) = parsed::<u64>(&lookup, "PROVIDER_TIMEOUT_MS").filter(|ms| *ms > 0) {
            self.provider_timeout = Duration::from_millis(ms);
        }
        if let Some(p) = parsed::<ProviderId>(&lookup, "DEFAULT_PROVIDER") {
            self.default_provider = p;
        }
        if let Some(n) = parsed::<u32>(&lookup, "BREAKER_FAILURE_THRESHOLD") {
            self.breaker.failure_threshold = n.max(1);
        }
        if let Some(ms) = parsed::<u64>(&lookup, "BREAKER_RESET_TIMEOUT_MS").filter(|ms| *ms > 0) {
            self.breaker.reset_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed::<u64>(&lookup, "HEALTH_INTERVAL_MS").filter(|ms| *ms > 0) {
            self.health.interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed::<u64>(&lookup, "HEALTH_PROBE_TIMEOUT_MS").filter(|ms| *ms > 0) {
            self.health.probe_timeout = Duration::from_millis(ms);
        }
        self
    }

    /// Structural checks; errors here mean the service cannot be built.
    pub fn ensure_valid(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::configuration_with_context(
                "max_attempts must be at least 1",
                ErrorContext::new().with_field_path("max_attempts"),
            ));
        }
        if self.provider_timeout.is_zero() {
            return Err(Error::configuration_with_context(
                "provider timeout must be positive",
                ErrorContext::new().with_field_path("provider_timeout_ms"),
            ));
        }
        self.breaker.validate()?;
        for (provider, cfg) in &self.breaker_overrides {
            cfg.validate().map_err(|_| {
                Error::configuration_with_context(
                    format!("invalid breaker override for {}", provider),
                    ErrorContext::new().with_field_path(format!("breaker_overrides.{}", provider)),
                )
            })?;
        }
        self.health.validate()?;
        if self.health.probe_timeout >= self.provider_timeout {
            return Err(Error::configuration_with_context(
                "health probe timeout must be shorter than the provider timeout",
                ErrorContext::new().with_field_path("health.probe_timeout_ms"),
            ));
        }
        Ok(())
    }

    /// Credential and structure report read from the process environment.
    pub fn validate(&self) -> ConfigReport {
        self.validate_with(|key| std::env::var(key).ok())
    }

    pub(crate) fn validate_with(&self, lookup: impl Fn(&str) -> Option<String>) -> ConfigReport {
        let mut issues = Vec::new();
        if let Err(e) = self.ensure_valid() {
            issues.push(e.to_string());
        }

        let providers: BTreeMap<ProviderId, CredentialStatus> = self
            .providers
            .iter()
            .map(|(id, settings)| {
                let api_key_env = settings.key_env(*id);
                let credential_present = lookup(&api_key_env)
                    .map(|v| !v.trim().is_empty())
                    .unwrap_or(false);
                if settings.enabled && !credential_present {
                    issues.push(format!("{}: credential {} is not set", id, api_key_env));
                }
                (
                    *id,
                    CredentialStatus {
                        enabled: settings.enabled,
                        api_key_env,
                        credential_present,
                    },
                )
            })
            .collect();

        let usable = providers
            .values()
            .any(|s| s.enabled && s.credential_present);
        if !usable {
            issues.push("no enabled provider has credentials".to_string());
        }

        ConfigReport {
            structurally_valid: self.ensure_valid().is_ok(),
            providers,
            issues,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialStatus {
    pub enabled: bool,
    pub api_key_env: String,
    pub credential_present: bool,
}

/// Outcome of [`ServiceConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigReport {
    pub structurally_valid: bool,
    pub providers: BTreeMap<ProviderId, CredentialStatus>,
    pub issues: Vec<String>,
}

impl ConfigReport {
    /// At least one enabled provider has credentials and the structure is sound.
    pub fn is_configured(&self) -> bool {
        self.structurally_valid
            && self
                .providers
                .values()
                .any(|s| s.enabled && s.credential_present)
    }

    pub fn usable_providers(&self) -> Vec<ProviderId> {
        self.providers
            .iter()
            .filter(|(_, s)| s.enabled && s.credential_present)
            .map(|(id, _)| *id)
            .collect()
    }
}
