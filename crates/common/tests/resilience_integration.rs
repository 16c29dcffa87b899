//! Integration tests for resilience module
//!
//! Drives the reconnect backoff schedule the way a reconnect loop does,
//! against tokio's paused clock.

#![cfg(feature = "runtime")]

use std::time::Duration;

use channelog_common::resilience::{Jitter, ReconnectBackoff, ReconnectBackoffConfig};

/// Validates the reconnect schedule against a simulated broker outage.
///
/// # Test Steps
/// 1. Fail three dials, sleeping the jittered delay after each
/// 2. Verify the total virtual time slept is within the jitter bounds of
///    1s + 2s + 4s
/// 3. Succeed once and reset
/// 4. Confirm the next failure is back at the floor
#[tokio::test(start_paused = true)]
async fn test_reconnect_schedule_under_paused_clock() {
    let mut backoff = ReconnectBackoff::new(ReconnectBackoffConfig::default());
    let start = tokio::time::Instant::now();

    for _ in 0..3 {
        tokio::time::sleep(backoff.next_delay()).await;
    }

    let slept = start.elapsed();
    assert!(slept >= Duration::from_millis(7_000 - 1_500), "slept {slept:?}");
    assert!(slept < Duration::from_millis(7_000 + 1_500), "slept {slept:?}");

    backoff.reset();
    assert_eq!(backoff.next_base_delay(), Duration::from_secs(1));
}

/// Validates that base delays never decrease across a long outage.
#[test]
fn test_base_delays_are_monotonic_up_to_ceiling() {
    let config = ReconnectBackoffConfig::from_millis(250, 4_000, 0);
    let mut backoff = ReconnectBackoff::new(config);

    let delays: Vec<Duration> = (0..12).map(|_| backoff.next_base_delay()).collect();

    assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(delays[0], Duration::from_millis(250));
    assert!(delays.iter().all(|d| *d <= Duration::from_millis(4_000)));
    assert_eq!(delays[11], Duration::from_millis(4_000));
}

/// Validates that a zero jitter spread disables randomisation entirely.
#[test]
fn test_zero_jitter_is_deterministic() {
    let mut backoff = ReconnectBackoff::new(ReconnectBackoffConfig::from_millis(100, 1_000, 0));
    assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    assert_eq!(backoff.next_delay(), Duration::from_millis(200));
    assert_eq!(Jitter::None.apply(Duration::from_millis(5)), Duration::from_millis(5));
}
