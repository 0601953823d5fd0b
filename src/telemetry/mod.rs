//! 选择审计模块：记录每次供应商选择决策及其结果（尽力而为，不阻塞请求路径）。
//!
//! Selection Audit Module.
//!
//! Every routing decision the service makes is reported to a [`SelectionSink`]:
//! which provider was chosen, why, which alternatives were considered and how the
//! call went. Sinks are best-effort; a failing sink never fails a request.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`SelectionEvent`] | One decision plus its outcome |
//! | [`SelectionSink`] | Trait for audit destinations |
//! | [`NoopSelectionSink`] | Default sink (no collection) |
//! | [`InMemorySelectionSink`] | Bounded in-memory sink for tests and introspection |
//! | [`CompositeSelectionSink`] | Multi-destination fan-out |
//! | [`BatchingSelectionSink`] | Bounded queue flushed in the background by size or interval |

mod batching;

pub use batching::{BatchingConfig, BatchingSelectionSink};

use crate::routing::{ScoredCandidate, Selection, SelectionReason};
use crate::types::ProviderId;
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// A provider choice and what happened when it was used.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionEvent {
    pub request_id: String,
    pub requester_id: String,
    pub provider: ProviderId,
    pub reason: SelectionReason,
    pub score: f64,
    pub alternatives: Vec<ScoredCandidate>,
    pub is_fallback: bool,
    pub experiment: Option<String>,
    pub success: bool,
    pub latency_ms: u64,
    /// USD.
    pub cost: f64,
    pub error: Option<String>,
    pub timestamp: f64,
}

impl SelectionEvent {
    pub fn from_selection(
        request_id: impl Into<String>,
        requester_id: impl Into<String>,
        selection: &Selection,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            requester_id: requester_id.into(),
            provider: selection.provider,
            reason: selection.reason,
            score: selection.score,
            alternatives: selection.alternatives.clone(),
            is_fallback: selection.is_fallback,
            experiment: selection.experiment.clone(),
            success: false,
            latency_ms: 0,
            cost: 0.0,
            error: None,
            timestamp: timestamp(),
        }
    }

    pub fn succeeded(mut self, latency: Duration, cost: f64) -> Self {
        self.success = true;
        self.latency_ms = latency.as_millis() as u64;
        self.cost = cost;
        self
    }

    pub fn failed(mut self, latency: Duration, error: impl Into<String>) -> Self {
        self.success = false;
        self.latency_ms = latency.as_millis() as u64;
        self.error = Some(error.into());
        self
    }
}

/// Audit destination for selection decisions.
///
/// `record` must return quickly; anything slow belongs behind a
/// [`BatchingSelectionSink`].
#[async_trait]
pub trait SelectionSink: Send + Sync {
    async fn record(&self, event: SelectionEvent) -> Result<()>;

    async fn record_batch(&self, events: Vec<SelectionEvent>) -> Result<()> {
        for e in events {
            self.record(e).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Release background resources. Nothing recorded afterwards is guaranteed to land.
    async fn shutdown(&self) -> Result<()> {
        self.flush().await
    }
}

pub struct NoopSelectionSink;

#[async_trait]
impl SelectionSink for NoopSelectionSink {
    async fn record(&self, _: SelectionEvent) -> Result<()> {
        Ok(())
    }
}

/// Returns a no-op selection sink.
pub fn noop_sink() -> Arc<dyn SelectionSink> {
    Arc::new(NoopSelectionSink)
}

/// Keeps the most recent `max_events` events.
pub struct InMemorySelectionSink {
    events: RwLock<VecDeque<SelectionEvent>>,
    max_events: usize,
}

impl InMemorySelectionSink {
    pub fn new(max: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_events: max.max(1),
        }
    }

    pub fn events(&self) -> Vec<SelectionEvent> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn events_for_request(&self, request_id: &str) -> Vec<SelectionEvent> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.request_id == request_id)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SelectionSink for InMemorySelectionSink {
    async fn record(&self, event: SelectionEvent) -> Result<()> {
        let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());
        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
        Ok(())
    }
}

/// Sends every event to each inner sink; one sink failing does not stop the others.
#[derive(Default)]
pub struct CompositeSelectionSink {
    sinks: Vec<Arc<dyn SelectionSink>>,
}

impl CompositeSelectionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(mut self, sink: Arc<dyn SelectionSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl SelectionSink for CompositeSelectionSink {
    async fn record(&self, event: SelectionEvent) -> Result<()> {
        for s in &self.sinks {
            if let Err(e) = s.record(event.clone()).await {
                tracing::warn!(error = %e, "selection sink rejected event");
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        for s in &self.sinks {
            let _ = s.flush().await;
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        for s in &self.sinks {
            if let Err(e) = s.shutdown().await {
                tracing::warn!(error = %e, "selection sink shutdown failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_event(request_id: &str) -> SelectionEvent {
    SelectionEvent {
        request_id: request_id.to_string(),
        requester_id: "user-1".into(),
        provider: ProviderId::Gpt4oMini,
        reason: SelectionReason::OnlyCandidate,
        score: 81.0,
        alternatives: Vec::new(),
        is_fallback: false,
        experiment: None,
        success: true,
        latency_ms: 900,
        cost: 0.0006,
        error: None,
        timestamp: 0.0,
    }
}
