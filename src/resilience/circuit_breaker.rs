use crate::clock::{self, Clock};
use crate::types::ProviderId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected until the reset timeout elapses
    Open,
    /// A bounded number of trial requests probe for recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures (consecutive, or within the window) before opening
    pub failure_threshold: u32,
    /// Time after the last failure before a half-open probe is allowed
    #[serde(with = "crate::config::duration_ms", rename = "reset_timeout_ms")]
    pub reset_timeout: Duration,
    /// Rolling window for volume and error-rate accounting
    #[serde(with = "crate::config::duration_ms", rename = "monitoring_window_ms")]
    pub monitoring_window: Duration,
    /// Trial calls admitted while half-open; all must succeed to close
    pub half_open_requests: u32,
    /// Minimum requests within the window before the breaker may open
    pub volume_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            monitoring_window: Duration::from_secs(60),
            half_open_requests: 3,
            volume_threshold: 10,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the reset timeout (time spent open before probing)
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set the rolling monitoring window
    pub fn with_monitoring_window(mut self, window: Duration) -> Self {
        self.monitoring_window = window;
        self
    }

    /// Set the number of half-open trial requests
    pub fn with_half_open_requests(mut self, n: u32) -> Self {
        self.half_open_requests = n.max(1);
        self
    }

    /// Set the minimum request volume before the breaker may trip
    pub fn with_volume_threshold(mut self, n: u32) -> Self {
        self.volume_threshold = n.max(1);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let positive = self.failure_threshold > 0
            && self.half_open_requests > 0
            && self.volume_threshold > 0
            && !self.reset_timeout.is_zero()
            && !self.monitoring_window.is_zero();
        if positive {
            Ok(())
        } else {
            Err(Error::configuration_with_context(
                "circuit breaker thresholds and durations must be positive",
                crate::ErrorContext::new().with_source("circuit_breaker"),
            ))
        }
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub rejected_requests: u64,
    pub requests_in_window: usize,
    pub failures_in_window: usize,
    pub half_open_trials: u32,
    pub last_failure: Option<Instant>,
    pub last_state_change: Instant,
    /// failures / requests within the window, 0 if no requests
    pub error_rate: f64,
}

/// Emitted on every state transition.
#[derive(Debug, Clone)]
pub struct BreakerEvent {
    pub provider: ProviderId,
    pub from: CircuitState,
    pub to: CircuitState,
    pub metrics: CircuitBreakerMetrics,
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    consecutive_failures: u32,
    total_successes: u64,
    total_failures: u64,
    rejected: u64,
    requests: VecDeque<Instant>,
    failures: VecDeque<Instant>,
    last_failure: Option<Instant>,
    last_state_change: Instant,
    half_open_trials: u32,
    half_open_successes: u32,
}

impl State {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            total_successes: 0,
            total_failures: 0,
            rejected: 0,
            requests: VecDeque::new(),
            failures: VecDeque::new(),
            last_failure: None,
            last_state_change: now,
            half_open_trials: 0,
            half_open_successes: 0,
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while matches!(self.requests.front(), Some(t) if now.saturating_duration_since(*t) > window)
        {
            self.requests.pop_front();
        }
        while matches!(self.failures.front(), Some(t) if now.saturating_duration_since(*t) > window)
        {
            self.failures.pop_front();
        }
    }
}

/// What an admitted call was counted as, so throttled calls can hand their slot back.
#[derive(Debug, Clone, Copy)]
struct Admission {
    half_open_trial: bool,
}

/// Per-provider failure gate with closed / open / half-open states.
///
/// - Opens once the window holds `volume_threshold` requests and the failure count
///   (consecutive or in-window) reaches `failure_threshold`
/// - Rate-limit errors are never counted as failures
/// - Transitions are serialized by one mutex, so every caller observes them in order
pub struct CircuitBreaker {
    provider: ProviderId,
    cfg: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    events: broadcast::Sender<BreakerEvent>,
}

impl CircuitBreaker {
    pub fn new(provider: ProviderId, cfg: CircuitBreakerConfig) -> Self {
        Self::with_clock(provider, cfg, clock::system())
    }

    pub fn with_clock(
        provider: ProviderId,
        cfg: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let now = clock.now();
        Self {
            provider,
            cfg,
            clock,
            state: Mutex::new(State::new(now)),
            events,
        }
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    /// Subscribe to state-change events. Any number of subscribers may listen.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `op` through the breaker.
    ///
    /// Rejected calls fail with [`Error::CircuitOpen`] without running `op`.
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(admission) = self.try_admit() else {
            return Err(Error::CircuitOpen {
                provider: self.provider,
            });
        };
        let outcome = op().await;
        self.settle(admission, &outcome);
        outcome
    }

    /// Like [`execute`](Self::execute), but rejected or failed calls are answered by `fallback`.
    pub async fn execute_with_fallback<F, Fut, G, GFut, T>(&self, op: F, fallback: G) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        G: FnOnce(Error) -> GFut,
        GFut: Future<Output = Result<T>>,
    {
        let Some(admission) = self.try_admit() else {
            return fallback(Error::CircuitOpen {
                provider: self.provider,
            })
            .await;
        };
        let outcome = op().await;
        self.settle(admission, &outcome);
        match outcome {
            Ok(v) => Ok(v),
            Err(e) => fallback(e).await,
        }
    }

    fn settle<T>(&self, admission: Admission, outcome: &Result<T>) {
        match outcome {
            Ok(_) => self.record_success(),
            Err(e) if e.is_rate_limited() => {
                debug!(provider = %self.provider, "rate-limited outcome not counted by breaker");
                if admission.half_open_trial {
                    let mut st = self.lock();
                    if st.state == CircuitState::HalfOpen {
                        st.half_open_trials = st.half_open_trials.saturating_sub(1);
                    }
                }
            }
            Err(_) => self.record_failure(),
        }
    }

    /// Whether a call would be admitted right now (does not reserve a trial slot).
    pub fn can_proceed(&self) -> bool {
        let now = self.clock.now();
        let mut st = self.lock();
        self.maybe_half_open(&mut st, now);
        match st.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => st.half_open_trials < self.cfg.half_open_requests,
        }
    }

    fn try_admit(&self) -> Option<Admission> {
        let now = self.clock.now();
        let mut st = self.lock();
        self.maybe_half_open(&mut st, now);
        let admission = match st.state {
            CircuitState::Closed => Admission {
                half_open_trial: false,
            },
            CircuitState::Open => {
                st.rejected += 1;
                return None;
            }
            CircuitState::HalfOpen => {
                if st.half_open_trials >= self.cfg.half_open_requests {
                    st.rejected += 1;
                    return None;
                }
                st.half_open_trials += 1;
                Admission {
                    half_open_trial: true,
                }
            }
        };
        st.prune(now, self.cfg.monitoring_window);
        st.requests.push_back(now);
        Some(admission)
    }

    fn maybe_half_open(&self, st: &mut State, now: Instant) {
        if st.state != CircuitState::Open {
            return;
        }
        let since = st.last_failure.unwrap_or(st.last_state_change);
        if now.saturating_duration_since(since) >= self.cfg.reset_timeout {
            st.half_open_trials = 0;
            st.half_open_successes = 0;
            self.transition(st, CircuitState::HalfOpen, now);
        }
    }

    pub fn record_success(&self) {
        let now = self.clock.now();
        let mut st = self.lock();
        st.prune(now, self.cfg.monitoring_window);
        st.total_successes += 1;
        st.consecutive_failures = 0;
        match st.state {
            CircuitState::HalfOpen => {
                st.half_open_successes += 1;
                if st.half_open_successes >= self.cfg.half_open_requests {
                    st.requests.clear();
                    st.failures.clear();
                    self.transition(&mut st, CircuitState::Closed, now);
                }
            }
            CircuitState::Closed => self.maybe_trip(&mut st, now),
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut st = self.lock();
        st.prune(now, self.cfg.monitoring_window);
        st.total_failures += 1;
        st.consecutive_failures = st.consecutive_failures.saturating_add(1);
        st.failures.push_back(now);
        st.last_failure = Some(now);
        match st.state {
            CircuitState::HalfOpen => self.transition(&mut st, CircuitState::Open, now),
            CircuitState::Closed => self.maybe_trip(&mut st, now),
            CircuitState::Open => {}
        }
    }

    fn maybe_trip(&self, st: &mut State, now: Instant) {
        let volume = st.requests.len() as u32;
        let failures = st.consecutive_failures.max(st.failures.len() as u32);
        if volume >= self.cfg.volume_threshold && failures >= self.cfg.failure_threshold {
            self.transition(st, CircuitState::Open, now);
        }
    }

    /// Force the breaker closed and clear all counters.
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut st = self.lock();
        let from = st.state;
        let rejected = st.rejected;
        let (successes, failures) = (st.total_successes, st.total_failures);
        *st = State::new(now);
        st.rejected = rejected;
        st.total_successes = successes;
        st.total_failures = failures;
        if from != CircuitState::Closed {
            st.state = from;
            self.transition(&mut st, CircuitState::Closed, now);
        }
    }

    /// Force the breaker open, as if a failure had just been recorded.
    pub fn force_open(&self) {
        let now = self.clock.now();
        let mut st = self.lock();
        st.last_failure = Some(now);
        if st.state != CircuitState::Open {
            self.transition(&mut st, CircuitState::Open, now);
        }
    }

    fn transition(&self, st: &mut State, to: CircuitState, now: Instant) {
        let from = st.state;
        if from == to {
            return;
        }
        st.state = to;
        st.last_state_change = now;
        if to != CircuitState::HalfOpen {
            st.half_open_trials = 0;
            st.half_open_successes = 0;
        }
        match to {
            CircuitState::Open => warn!(
                provider = %self.provider,
                from = %from,
                consecutive_failures = st.consecutive_failures,
                "circuit breaker opened"
            ),
            _ => info!(
                provider = %self.provider,
                from = %from,
                to = %to,
                "circuit breaker transition"
            ),
        }
        let metrics = self.metrics_locked(st);
        // Sent under the lock so subscribers observe transitions in order.
        let _ = self.events.send(BreakerEvent {
            provider: self.provider,
            from,
            to,
            metrics,
        });
    }

    fn metrics_locked(&self, st: &State) -> CircuitBreakerMetrics {
        let requests = st.requests.len();
        let failures = st.failures.len();
        let error_rate = if requests == 0 {
            0.0
        } else {
            (failures as f64 / requests as f64).min(1.0)
        };
        CircuitBreakerMetrics {
            state: st.state,
            consecutive_failures: st.consecutive_failures,
            total_successes: st.total_successes,
            total_failures: st.total_failures,
            rejected_requests: st.rejected,
            requests_in_window: requests,
            failures_in_window: failures,
            half_open_trials: st.half_open_trials,
            last_failure: st.last_failure,
            last_state_change: st.last_state_change,
            error_rate,
        }
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let now = self.clock.now();
        let mut st = self.lock();
        st.prune(now, self.cfg.monitoring_window);
        self.metrics_locked(&st)
    }

    /// Current state, applying a due open -> half-open transition first.
    pub fn state(&self) -> CircuitState {
        let now = self.clock.now();
        let mut st = self.lock();
        self.maybe_half_open(&mut st, now);
        st.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn breaker(cfg: CircuitBreakerConfig) -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::new();
        let cb = CircuitBreaker::with_clock(ProviderId::Gpt4o, cfg, Arc::new(clock.clone()));
        (cb, clock)
    }

    fn small_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(3)
            .with_volume_threshold(3)
            .with_half_open_requests(2)
            .with_reset_timeout(Duration::from_secs(30))
            .with_monitoring_window(Duration::from_secs(60))
    }

    async fn fail(cb: &CircuitBreaker) -> Result<()> {
        cb.execute(|| async { Err::<(), _>(Error::provider(ProviderId::Gpt4o, "503 upstream")) })
            .await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<u32> {
        cb.execute(|| async { Ok(7u32) }).await
    }

    #[test]
    fn test_circuit_breaker_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.reset_timeout, Duration::from_secs(60));
        assert_eq!(config.half_open_requests, 3);
        assert_eq!(config.volume_threshold, 10);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_initial_state_closed() {
        let (cb, _) = breaker(small_config());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_proceed());
        assert_eq!(succeed(&cb).await.unwrap(), 7);
        let m = cb.metrics();
        assert_eq!(m.total_successes, 1);
        assert_eq!(m.requests_in_window, 1);
        assert_eq!(m.error_rate, 0.0);
    }

    #[tokio::test]
    async fn test_opens_at_threshold_with_volume() {
        let (cb, _) = breaker(small_config());
        assert!(fail(&cb).await.is_err());
        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        let rejected = succeed(&cb).await.unwrap_err();
        assert!(rejected.is_circuit_open());
        assert_eq!(cb.metrics().rejected_requests, 1);
    }

    #[tokio::test]
    async fn test_volume_threshold_holds_breaker_closed() {
        let cfg = small_config().with_volume_threshold(10);
        let (cb, _) = breaker(cfg);
        for _ in 0..5 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().consecutive_failures, 5);
    }

    #[tokio::test]
    async fn test_scattered_failures_in_window_trip() {
        let (cb, _) = breaker(small_config().with_volume_threshold(5));
        let _ = fail(&cb).await;
        succeed(&cb).await.unwrap();
        let _ = fail(&cb).await;
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_half_open_after_reset_timeout() {
        let (cb, clock) = breaker(small_config());
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        clock.advance(Duration::from_secs(29));
        assert_eq!(cb.state(), CircuitState::Open);
        clock.advance(Duration::from_secs(1));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_half_open_admits_bounded_trials_then_closes() {
        let (cb, clock) = breaker(small_config());
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        clock.advance(Duration::from_secs(30));

        assert!(cb.try_admit().is_some());
        assert!(cb.try_admit().is_some());
        assert!(cb.try_admit().is_none());
        assert!(!cb.can_proceed());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let (cb, clock) = breaker(small_config());
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        clock.advance(Duration::from_secs(30));
        succeed(&cb).await.unwrap();
        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(10));
        assert!(succeed(&cb).await.unwrap_err().is_circuit_open());
    }

    #[tokio::test]
    async fn test_rate_limit_errors_not_counted() {
        let (cb, _) = breaker(small_config());
        for _ in 0..10 {
            let err = cb
                .execute(|| async {
                    Err::<(), _>(Error::provider(ProviderId::Gpt4o, "429 Too Many Requests"))
                })
                .await
                .unwrap_err();
            assert!(err.is_rate_limited());
        }
        let m = cb.metrics();
        assert_eq!(m.state, CircuitState::Closed);
        assert_eq!(m.consecutive_failures, 0);
        assert_eq!(m.total_failures, 0);
    }

    #[tokio::test]
    async fn test_fallback_absorbs_rejection() {
        let (cb, _) = breaker(small_config());
        cb.force_open();
        let value = cb
            .execute_with_fallback(|| async { Ok(1u32) }, |_| async { Ok(99u32) })
            .await
            .unwrap();
        assert_eq!(value, 99);
    }

    #[tokio::test]
    async fn test_events_broadcast_to_all_subscribers() {
        let (cb, _) = breaker(small_config());
        let mut a = cb.subscribe();
        let mut b = cb.subscribe();
        cb.force_open();
        cb.reset();

        for rx in [&mut a, &mut b] {
            let opened = rx.recv().await.unwrap();
            assert_eq!(opened.from, CircuitState::Closed);
            assert_eq!(opened.to, CircuitState::Open);
            assert_eq!(opened.provider, ProviderId::Gpt4o);
            let closed = rx.recv().await.unwrap();
            assert_eq!(closed.to, CircuitState::Closed);
        }
    }

    #[tokio::test]
    async fn test_window_prunes_old_requests() {
        let (cb, clock) = breaker(small_config());
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        clock.advance(Duration::from_secs(61));
        let m = cb.metrics();
        assert_eq!(m.requests_in_window, 0);
        assert_eq!(m.failures_in_window, 0);
        assert_eq!(m.error_rate, 0.0);
    }

    #[test]
    fn test_circuit_breaker_thread_safe() {
        let cfg = small_config().with_failure_threshold(1000).with_volume_threshold(1000);
        let cb = Arc::new(CircuitBreaker::new(ProviderId::Gpt4o, cfg));
        let mut handles = vec![];
        for _ in 0..10 {
            let cb_clone = Arc::clone(&cb);
            handles.push(std::thread::spawn(move || {
                for _ in 0..5 {
                    cb_clone.record_failure();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cb.metrics().consecutive_failures, 50);
    }
}
