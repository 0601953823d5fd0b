//! State-machine properties of the per-provider circuit breaker.

use doc_enhance_core::clock::ManualClock;
use doc_enhance_core::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use doc_enhance_core::types::ProviderId;
use doc_enhance_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_test::{assert_err, assert_ok};

const RESET: Duration = Duration::from_secs(60);

fn breaker(clock: &ManualClock) -> CircuitBreaker {
    CircuitBreaker::with_clock(
        ProviderId::Gpt4o,
        CircuitBreakerConfig::new()
            .with_failure_threshold(5)
            .with_volume_threshold(10)
            .with_reset_timeout(RESET)
            .with_monitoring_window(Duration::from_secs(60))
            .with_half_open_requests(3),
        Arc::new(clock.clone()),
    )
}

async fn call(b: &CircuitBreaker, ok: bool) -> Result<()> {
    b.execute(|| async move {
        if ok {
            Ok(())
        } else {
            Err(Error::provider(ProviderId::Gpt4o, "upstream 500"))
        }
    })
    .await
}

async fn trip(b: &CircuitBreaker) {
    for _ in 0..10 {
        let _ = call(b, false).await;
    }
    assert_eq!(b.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_opens_exactly_when_failures_reach_threshold_in_volume() {
    // Every outcome pattern of ten calls inside one window.
    for pattern in 0u32..(1 << 10) {
        let clock = ManualClock::new();
        let b = breaker(&clock);
        for bit in 0..10 {
            let ok = pattern & (1 << bit) == 0;
            let outcome = call(&b, ok).await;
            assert_eq!(outcome.is_ok(), ok, "pattern {pattern:#012b} call {bit}");
        }
        let failures = pattern.count_ones();
        let expected = if failures >= 5 {
            CircuitState::Open
        } else {
            CircuitState::Closed
        };
        assert_eq!(b.state(), expected, "pattern {pattern:#012b}");
    }
}

#[tokio::test]
async fn test_no_trip_below_volume_threshold() {
    let clock = ManualClock::new();
    let b = breaker(&clock);
    for _ in 0..9 {
        assert_err!(call(&b, false).await);
    }
    assert_eq!(b.state(), CircuitState::Closed);
    assert_eq!(b.metrics().consecutive_failures, 9);
}

#[tokio::test]
async fn test_failures_outside_window_do_not_count() {
    let clock = ManualClock::new();
    let b = breaker(&clock);
    for _ in 0..4 {
        assert_err!(call(&b, false).await);
    }
    clock.advance(Duration::from_secs(61));
    assert_ok!(call(&b, true).await);
    for _ in 0..5 {
        assert_ok!(call(&b, true).await);
    }
    assert_eq!(b.state(), CircuitState::Closed);
    assert_eq!(b.metrics().failures_in_window, 0);
}

#[tokio::test]
async fn test_open_rejects_until_reset_timeout() {
    let clock = ManualClock::new();
    let b = breaker(&clock);
    trip(&b).await;

    clock.advance(RESET - Duration::from_millis(1));
    let mut ran = false;
    let err = assert_err!(
        b.execute(|| {
            ran = true;
            async { Ok::<_, Error>(()) }
        })
        .await
    );
    assert!(err.is_circuit_open());
    assert!(!ran);
    assert_eq!(b.metrics().rejected_requests, 1);

    clock.advance(Duration::from_millis(1));
    assert_eq!(b.state(), CircuitState::HalfOpen);
}

#[tokio::test]
async fn test_half_open_admits_bounded_concurrent_trials() {
    let clock = ManualClock::new();
    let b = Arc::new(breaker(&clock));
    trip(&b).await;
    clock.advance(RESET);

    let gate = Arc::new(Semaphore::new(0));
    let mut trials = Vec::new();
    for _ in 0..3 {
        let b = b.clone();
        let gate = gate.clone();
        trials.push(tokio::spawn(async move {
            b.execute(move || async move {
                let _permit = gate.acquire().await.expect("gate closed");
                Ok::<_, Error>(())
            })
            .await
        }));
    }
    while b.metrics().half_open_trials < 3 {
        tokio::task::yield_now().await;
    }

    let err = assert_err!(call(&b, true).await);
    assert!(err.is_circuit_open());

    gate.add_permits(3);
    for t in trials {
        assert_ok!(t.await.unwrap());
    }
    assert_eq!(b.state(), CircuitState::Closed);
    assert_eq!(b.metrics().consecutive_failures, 0);
}

#[tokio::test]
async fn test_single_half_open_failure_reopens() {
    let clock = ManualClock::new();
    let b = breaker(&clock);
    trip(&b).await;
    clock.advance(RESET);

    assert_ok!(call(&b, true).await);
    assert_eq!(b.state(), CircuitState::HalfOpen);
    assert_err!(call(&b, false).await);
    assert_eq!(b.state(), CircuitState::Open);

    // The reset timeout restarts from the trial failure.
    clock.advance(RESET - Duration::from_secs(1));
    assert_eq!(b.state(), CircuitState::Open);
    clock.advance(Duration::from_secs(1));
    assert_eq!(b.state(), CircuitState::HalfOpen);
}

#[tokio::test]
async fn test_rate_limited_outcomes_never_count() {
    let clock = ManualClock::new();
    let b = breaker(&clock);
    for _ in 0..50 {
        let err = assert_err!(
            b.execute(|| async {
                Err::<(), _>(Error::rate_limited(
                    ProviderId::Gpt4o,
                    "429 Too Many Requests",
                    Some(Duration::from_secs(2)),
                ))
            })
            .await
        );
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    }
    let metrics = b.metrics();
    assert_eq!(metrics.state, CircuitState::Closed);
    assert_eq!(metrics.total_failures, 0);
    assert_eq!(metrics.consecutive_failures, 0);
}

#[tokio::test]
async fn test_rate_limited_trial_frees_its_half_open_slot() {
    let clock = ManualClock::new();
    let b = breaker(&clock);
    trip(&b).await;
    clock.advance(RESET);

    for _ in 0..5 {
        let _ = b
            .execute(|| async {
                Err::<(), _>(Error::rate_limited(ProviderId::Gpt4o, "slow down", None))
            })
            .await;
    }
    assert_eq!(b.state(), CircuitState::HalfOpen);
    assert_eq!(b.metrics().half_open_trials, 0);
    for _ in 0..3 {
        assert_ok!(call(&b, true).await);
    }
    assert_eq!(b.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_transitions_are_published_in_order() {
    let clock = ManualClock::new();
    let b = breaker(&clock);
    let mut events = b.subscribe();

    trip(&b).await;
    clock.advance(RESET);
    for _ in 0..3 {
        assert_ok!(call(&b, true).await);
    }

    let seen: Vec<(CircuitState, CircuitState)> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| (e.from, e.to))
        .collect();
    assert_eq!(
        seen,
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
}
