use super::record::{HealthRecord, HealthStatus, ProbeOutcome};
use crate::clock::{self, Clock};
use crate::provider::ProviderRegistry;
use crate::types::ProviderId;
use crate::{Error, ErrorContext, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    #[serde(with = "crate::config::duration_ms", rename = "interval_ms")]
    pub interval: Duration,
    #[serde(with = "crate::config::duration_ms", rename = "probe_timeout_ms")]
    pub probe_timeout: Duration,
    /// Consecutive probe failures that mark a provider unhealthy
    pub failure_threshold: u32,
    /// Window error rate above which a provider is unhealthy; half of it degrades
    pub error_rate_threshold: f64,
    #[serde(with = "crate::config::duration_ms", rename = "degraded_latency_ms")]
    pub degraded_latency: Duration,
    #[serde(with = "crate::config::duration_ms", rename = "healthy_latency_ms")]
    pub healthy_latency: Duration,
    pub window_size: usize,
    #[serde(with = "crate::config::duration_ms", rename = "retention_ms")]
    pub retention: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            error_rate_threshold: 0.5,
            degraded_latency: Duration::from_secs(5),
            healthy_latency: Duration::from_secs(2),
            window_size: 20,
            retention: Duration::from_secs(3600),
        }
    }
}

impl HealthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n.max(1);
        self
    }

    pub fn with_error_rate_threshold(mut self, rate: f64) -> Self {
        self.error_rate_threshold = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_latency_thresholds(mut self, healthy: Duration, degraded: Duration) -> Self {
        self.healthy_latency = healthy;
        self.degraded_latency = degraded;
        self
    }

    pub fn with_window_size(mut self, n: usize) -> Self {
        self.window_size = n.max(1);
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let ok = !self.interval.is_zero()
            && !self.probe_timeout.is_zero()
            && self.failure_threshold > 0
            && (0.0..=1.0).contains(&self.error_rate_threshold)
            && self.healthy_latency <= self.degraded_latency
            && self.window_size > 0
            && !self.retention.is_zero();
        if ok {
            Ok(())
        } else {
            Err(Error::configuration_with_context(
                "health thresholds, window and durations must be positive and ordered",
                ErrorContext::new().with_field_path("health"),
            ))
        }
    }
}

/// Emitted only when a probe changes a provider's status.
#[derive(Debug, Clone)]
pub struct HealthChangeEvent {
    pub provider: ProviderId,
    pub old: HealthStatus,
    pub new: HealthStatus,
    pub record: HealthRecord,
}

struct ProbeTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Active health checks for every registered provider.
///
/// Records live in a `DashMap`; each update holds that provider's shard entry, so
/// change events leave in the order probes complete.
pub struct HealthMonitor {
    cfg: HealthConfig,
    providers: ProviderRegistry,
    records: DashMap<ProviderId, HealthRecord>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<HealthChangeEvent>,
    root: CancellationToken,
    tasks: Mutex<HashMap<ProviderId, ProbeTask>>,
}

impl HealthMonitor {
    pub fn new(providers: ProviderRegistry, cfg: HealthConfig) -> Self {
        Self::with_clock(providers, cfg, clock::system())
    }

    pub fn with_clock(
        providers: ProviderRegistry,
        cfg: HealthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let records = DashMap::new();
        for id in providers.ids() {
            records.insert(id, HealthRecord::new(id));
        }
        let (events, _) = broadcast::channel(64);
        Self {
            cfg,
            providers,
            records,
            clock,
            events,
            root: CancellationToken::new(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.cfg
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealthChangeEvent> {
        self.events.subscribe()
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, HashMap<ProviderId, ProbeTask>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn one periodic probe task per registered provider.
    ///
    /// Each task probes immediately, then every `interval`. Calling `start` again
    /// only spawns tasks for providers that are not already running.
    pub fn start(self: &Arc<Self>) {
        for id in self.providers.ids() {
            self.start_provider(id);
        }
    }

    pub fn start_provider(self: &Arc<Self>, id: ProviderId) {
        if self.root.is_cancelled() || !self.providers.contains(id) {
            return;
        }
        let mut tasks = self.tasks();
        if tasks.get(&id).is_some_and(|t| !t.handle.is_finished()) {
            return;
        }
        let token = self.root.child_token();
        let handle = tokio::spawn(probe_loop(
            Arc::downgrade(self),
            id,
            self.cfg.interval,
            token.clone(),
        ));
        debug!(
            provider = %id,
            interval_ms = self.cfg.interval.as_millis() as u64,
            "health probe task started"
        );
        tasks.insert(id, ProbeTask { token, handle });
    }

    /// Cancel one provider's probe task and wait for it to exit.
    pub async fn stop_provider(&self, id: ProviderId) {
        let task = self.tasks().remove(&id);
        if let Some(task) = task {
            task.token.cancel();
            if let Err(e) = task.handle.await {
                warn!(provider = %id, error = %e, "health probe task ended abnormally");
            }
            debug!(provider = %id, "health probe task stopped");
        }
    }

    /// Cancel every probe task and wait for all of them. No probe runs afterwards.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let tasks: Vec<(ProviderId, ProbeTask)> = self.tasks().drain().collect();
        for (id, task) in tasks {
            if let Err(e) = task.handle.await {
                warn!(provider = %id, error = %e, "health probe task ended abnormally");
            }
        }
        info!("health monitor stopped");
    }

    pub fn is_running(&self, id: ProviderId) -> bool {
        self.tasks()
            .get(&id)
            .is_some_and(|t| !t.handle.is_finished() && !t.token.is_cancelled())
    }

    /// Probe one provider now and fold the result into its record.
    pub async fn check_now(&self, id: ProviderId) -> Result<HealthRecord> {
        let client = self.providers.get(id)?;
        let started = tokio::time::Instant::now();
        let probe = tokio::time::timeout(self.cfg.probe_timeout, client.probe()).await;
        let latency = started.elapsed();
        let (success, error) = match probe {
            Ok(Ok(reply)) if reply.is_expected() => (true, None),
            Ok(Ok(reply)) => (false, Some(format!("unexpected probe reply: {}", reply.text))),
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (false, Some("health probe timed out".to_string())),
        };
        Ok(self.record_probe(id, success, latency, error))
    }

    /// Fold an externally measured probe into the record.
    pub fn record_probe(
        &self,
        id: ProviderId,
        success: bool,
        latency: Duration,
        error: Option<String>,
    ) -> HealthRecord {
        let outcome = ProbeOutcome {
            success,
            latency,
            at: self.clock.now(),
            error,
        };
        let mut entry = self
            .records
            .entry(id)
            .or_insert_with(|| HealthRecord::new(id));
        let previous = entry.apply(outcome, &self.cfg);
        let record = entry.clone();

        debug!(
            provider = %id,
            success,
            latency_ms = latency.as_millis() as u64,
            status = %record.status,
            "health probe recorded"
        );
        if previous != record.status {
            match record.status {
                HealthStatus::Unhealthy => {
                    warn!(provider = %id, from = %previous, "provider unhealthy")
                }
                _ => info!(
                    provider = %id,
                    from = %previous,
                    to = %record.status,
                    "provider health changed"
                ),
            }
            // Sent while the entry is held so events follow probe order.
            let _ = self.events.send(HealthChangeEvent {
                provider: id,
                old: previous,
                new: record.status,
                record: record.clone(),
            });
        }
        drop(entry);
        record
    }

    /// Drop probe outcomes older than the retention period from every record.
    pub fn cleanup_expired(&self) {
        let now = self.clock.now();
        for mut entry in self.records.iter_mut() {
            entry.expire(now, self.cfg.retention);
        }
    }

    pub fn get_status(&self, id: ProviderId) -> Option<HealthRecord> {
        self.records.get(&id).map(|r| r.clone())
    }

    /// Current status; providers without a record are reported healthy.
    pub fn status(&self, id: ProviderId) -> HealthStatus {
        self.records
            .get(&id)
            .map(|r| r.status)
            .unwrap_or(HealthStatus::Healthy)
    }

    pub fn all_statuses(&self) -> BTreeMap<ProviderId, HealthRecord> {
        self.records
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    pub fn is_healthy(&self, id: ProviderId) -> bool {
        self.status(id) == HealthStatus::Healthy
    }

    pub fn health_score(&self, id: ProviderId) -> u8 {
        self.records
            .get(&id)
            .map(|r| r.health_score(&self.cfg))
            .unwrap_or(100)
    }
}

async fn probe_loop(
    monitor: Weak<HealthMonitor>,
    id: ProviderId,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(monitor) = monitor.upgrade() else {
            break;
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            res = monitor.check_now(id) => {
                if let Err(e) = res {
                    warn!(provider = %id, error = %e, "health probe could not run");
                }
                monitor.cleanup_expired();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::provider::{ProbeReply, ProviderClient};
    use crate::types::{
        DocumentAnalysis, DocumentRef, EnhancementPlan, ProviderReply, RequestContext,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct ScriptedProbe {
        id: ProviderId,
        healthy: AtomicBool,
        delay: Duration,
        probes: AtomicU32,
    }

    impl ScriptedProbe {
        fn new(id: ProviderId, healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                id,
                healthy: AtomicBool::new(healthy),
                delay: Duration::from_millis(100),
                probes: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedProbe {
        fn id(&self) -> ProviderId {
            self.id
        }

        async fn analyze(
            &self,
            _: &DocumentRef,
            _: &RequestContext,
        ) -> Result<ProviderReply<DocumentAnalysis>> {
            Ok(ProviderReply::ok(DocumentAnalysis::default()))
        }

        async fn generate(
            &self,
            _: &DocumentAnalysis,
            _: &RequestContext,
        ) -> Result<ProviderReply<EnhancementPlan>> {
            Ok(ProviderReply::ok(EnhancementPlan::default()))
        }

        fn cost_per_1k_tokens(&self) -> f64 {
            0.001
        }

        async fn probe(&self) -> Result<ProbeReply> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.healthy.load(Ordering::SeqCst) {
                Ok(ProbeReply::new("OK"))
            } else {
                Err(Error::provider(self.id, "503 service unavailable"))
            }
        }
    }

    fn monitor_with(probe: Arc<ScriptedProbe>) -> Arc<HealthMonitor> {
        let mut registry = ProviderRegistry::new();
        registry.register(probe);
        Arc::new(HealthMonitor::with_clock(
            registry,
            HealthConfig::default(),
            Arc::new(ManualClock::new()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_probed_is_healthy() {
        let monitor = monitor_with(ScriptedProbe::new(ProviderId::Gpt4o, true));
        assert!(monitor.is_healthy(ProviderId::Gpt4o));
        assert_eq!(monitor.health_score(ProviderId::Gpt4o), 100);
        assert_eq!(monitor.status(ProviderId::ClaudeSonnet), HealthStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_flip_to_unhealthy_once() {
        let probe = ScriptedProbe::new(ProviderId::Gpt4o, false);
        let monitor = monitor_with(probe);
        let mut events = monitor.subscribe();

        // first failure: error rate 1.0 already exceeds the threshold
        let rec = monitor.check_now(ProviderId::Gpt4o).await.unwrap();
        assert_eq!(rec.status, HealthStatus::Unhealthy);
        monitor.check_now(ProviderId::Gpt4o).await.unwrap();
        let rec = monitor.check_now(ProviderId::Gpt4o).await.unwrap();
        assert_eq!(rec.consecutive_failures, 3);

        let ev = events.recv().await.unwrap();
        assert_eq!(ev.old, HealthStatus::Healthy);
        assert_eq!(ev.new, HealthStatus::Unhealthy);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_threshold_in_mixed_window() {
        let probe = ScriptedProbe::new(ProviderId::Gpt4o, true);
        let monitor = monitor_with(probe.clone());
        for _ in 0..5 {
            monitor.check_now(ProviderId::Gpt4o).await.unwrap();
        }
        probe.healthy.store(false, Ordering::SeqCst);
        let rec = monitor.check_now(ProviderId::Gpt4o).await.unwrap();
        assert_eq!(rec.status, HealthStatus::Degraded);
        monitor.check_now(ProviderId::Gpt4o).await.unwrap();
        let rec = monitor.check_now(ProviderId::Gpt4o).await.unwrap();
        assert_eq!(rec.status, HealthStatus::Unhealthy);

        probe.healthy.store(true, Ordering::SeqCst);
        let rec = monitor.check_now(ProviderId::Gpt4o).await.unwrap();
        assert_eq!(rec.consecutive_failures, 0);
        // 3 of 9 failed: still above half the threshold
        assert_eq!(rec.status, HealthStatus::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_counts_as_failure() {
        let probe = Arc::new(ScriptedProbe {
            id: ProviderId::GeminiPro,
            healthy: AtomicBool::new(true),
            delay: Duration::from_secs(10),
            probes: AtomicU32::new(0),
        });
        let monitor = monitor_with(probe);
        let rec = monitor.check_now(ProviderId::GeminiPro).await.unwrap();
        let last = rec.recent.back().unwrap();
        assert!(!last.success);
        assert_eq!(last.error.as_deref(), Some("health probe timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_probes_and_stop() {
        let probe = ScriptedProbe::new(ProviderId::Gpt4o, true);
        let monitor = monitor_with(probe.clone());
        monitor.start();
        assert!(monitor.is_running(ProviderId::Gpt4o));

        // immediate probe, then one per interval
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(probe.probes.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(probe.probes.load(Ordering::SeqCst), 3);

        monitor.stop_provider(ProviderId::Gpt4o).await;
        assert!(!monitor.is_running(ProviderId::Gpt4o));
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(probe.probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_all_tasks() {
        let probe = ScriptedProbe::new(ProviderId::Gpt4oMini, true);
        let monitor = monitor_with(probe.clone());
        monitor.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        monitor.shutdown().await;
        let seen = probe.probes.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(probe.probes.load(Ordering::SeqCst), seen);

        // a stopped monitor does not restart
        monitor.start();
        assert!(!monitor.is_running(ProviderId::Gpt4oMini));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_resets_error_rate_of_emptied_window() {
        let clock = ManualClock::new();
        let mut registry = ProviderRegistry::new();
        registry.register(ScriptedProbe::new(ProviderId::Gpt4o, true));
        let monitor = HealthMonitor::with_clock(
            registry,
            HealthConfig::default(),
            Arc::new(clock.clone()),
        );
        let rec = monitor.record_probe(
            ProviderId::Gpt4o,
            false,
            Duration::from_millis(10),
            Some("503".into()),
        );
        assert_eq!(rec.error_rate, 1.0);

        clock.advance(Duration::from_secs(3700));
        monitor.cleanup_expired();
        let rec = monitor.get_status(ProviderId::Gpt4o).unwrap();
        assert!(rec.recent.is_empty());
        assert_eq!(rec.error_rate, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_provider_check_is_error() {
        let monitor = monitor_with(ScriptedProbe::new(ProviderId::Gpt4o, true));
        assert!(monitor.check_now(ProviderId::ClaudeSonnet).await.is_err());
    }
}
