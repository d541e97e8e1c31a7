//! Integration tests for the `time` module.
//!
//! Checks that code written against the `Clock` trait behaves the same with
//! the mock clock and the tokio-backed system clock.

#![cfg(feature = "runtime")]

use std::sync::Arc;
use std::time::Duration;

use faultline_common::time::{Clock, MockClock, SystemClock};

/// Waits out `cooldown` and reports how long the clock says it waited.
async fn wait_for_cooldown<C: Clock>(clock: &C, cooldown: Duration) -> Duration {
    let start = clock.now();
    clock.sleep(cooldown).await;
    clock.now().duration_since(start)
}

/// Validates deterministic waiting with the mock clock.
///
/// # Test Steps
/// 1. Wait for a one-minute cooldown through the mock clock
/// 2. Confirm the call returns immediately with exactly one minute elapsed
/// 3. Confirm the sleep was recorded
#[tokio::test]
async fn test_mock_clock_cooldown_is_instant_and_exact() {
    let clock = MockClock::new();
    let waited = wait_for_cooldown(&clock, Duration::from_secs(60)).await;

    assert_eq!(waited, Duration::from_secs(60));
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(60)]);
}

/// Validates the system clock against paused tokio time.
#[tokio::test(start_paused = true)]
async fn test_system_clock_cooldown_with_paused_time() {
    let waited = wait_for_cooldown(&SystemClock, Duration::from_secs(60)).await;
    assert!(waited >= Duration::from_secs(60));
}

/// Validates that concurrent tasks sharing one mock clock see each other's
/// sleeps.
#[tokio::test(flavor = "multi_thread")]
async fn test_shared_mock_clock_across_tasks() {
    let clock = Arc::new(MockClock::new());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let clock = Arc::clone(&clock);
            tokio::spawn(async move { clock.sleep(Duration::from_millis(250)).await })
        })
        .collect();
    for handle in handles {
        handle.await.expect("task should not panic");
    }

    assert_eq!(clock.elapsed(), Duration::from_secs(1));
    assert_eq!(clock.sleeps().len(), 4);
}
