//! Per-provider health record and status classification.

use super::HealthConfig;
use crate::types::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        })
    }
}

/// One probe result kept in the ring buffer.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub success: bool,
    pub latency: Duration,
    pub at: Instant,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub provider: ProviderId,
    pub status: HealthStatus,
    pub last_response_time: Option<Duration>,
    pub consecutive_failures: u32,
    /// Failed probes / probes in the window.
    pub error_rate: f64,
    pub total_probes: u64,
    pub last_checked: Option<Instant>,
    pub recent: VecDeque<ProbeOutcome>,
}

impl HealthRecord {
    /// Never-probed providers start out healthy.
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            status: HealthStatus::Healthy,
            last_response_time: None,
            consecutive_failures: 0,
            error_rate: 0.0,
            total_probes: 0,
            last_checked: None,
            recent: VecDeque::new(),
        }
    }

    /// Fold a probe into the record; returns the previous status.
    pub(crate) fn apply(&mut self, mut outcome: ProbeOutcome, cfg: &HealthConfig) -> HealthStatus {
        let previous = self.status;
        if let Some(last) = self.last_checked {
            if outcome.at < last {
                outcome.at = last;
            }
        }
        self.last_checked = Some(outcome.at);
        self.last_response_time = Some(outcome.latency);
        self.total_probes += 1;
        if outcome.success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }

        let (success, latency, now) = (outcome.success, outcome.latency, outcome.at);
        self.recent.push_back(outcome);
        while self.recent.len() > cfg.window_size.max(1) {
            self.recent.pop_front();
        }
        self.expire(now, cfg.retention);
        self.status = classify(cfg, success, latency, self.consecutive_failures, self.error_rate);
        previous
    }

    /// Drop probe outcomes older than `retention`, regardless of count.
    ///
    /// `error_rate` always reflects the outcomes that remain.
    pub(crate) fn expire(&mut self, now: Instant, retention: Duration) {
        while matches!(
            self.recent.front(),
            Some(o) if now.saturating_duration_since(o.at) > retention
        ) {
            self.recent.pop_front();
        }
        self.error_rate = self.window_error_rate();
    }

    fn window_error_rate(&self) -> f64 {
        if self.recent.is_empty() {
            return 0.0;
        }
        let failed = self.recent.iter().filter(|o| !o.success).count();
        failed as f64 / self.recent.len() as f64
    }

    /// 0-100 blend: 70% window success rate, 30% latency relative to the degraded threshold.
    pub fn health_score(&self, cfg: &HealthConfig) -> u8 {
        if self.recent.is_empty() {
            return match self.status {
                HealthStatus::Healthy => 100,
                HealthStatus::Degraded => 50,
                HealthStatus::Unhealthy => 0,
            };
        }
        let n = self.recent.len() as f64;
        let success_rate = self.recent.iter().filter(|o| o.success).count() as f64 / n;
        let avg_latency = self.recent.iter().map(|o| o.latency.as_secs_f64()).sum::<f64>() / n;
        let scale = cfg.degraded_latency.as_secs_f64().max(f64::EPSILON);
        let latency_score = (1.0 - avg_latency / scale).clamp(0.0, 1.0);
        (success_rate * 70.0 + latency_score * 30.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Status for one probe given the aggregate signals.
///
/// Anything that is neither clearly unhealthy nor clearly healthy lands on degraded.
pub(crate) fn classify(
    cfg: &HealthConfig,
    success: bool,
    latency: Duration,
    consecutive_failures: u32,
    error_rate: f64,
) -> HealthStatus {
    if consecutive_failures >= cfg.failure_threshold || error_rate > cfg.error_rate_threshold {
        HealthStatus::Unhealthy
    } else if latency > cfg.degraded_latency || error_rate > cfg.error_rate_threshold / 2.0 {
        HealthStatus::Degraded
    } else if success && latency <= cfg.healthy_latency {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}
