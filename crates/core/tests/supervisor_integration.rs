//! Integration tests for `ConnectionSupervisor`: reconnect loop, backoff
//! timing, pool swaps, forced reconnect and shutdown.

mod support;

use std::time::Duration;

use channelog_common::assert_eventually_async;
use channelog_common::resilience::ReconnectBackoffConfig;
use channelog_core::{BrokerError, BrokerErrorKind, SupervisorState};
use support::{connected_supervisor, fast_config, supervisor, wait_for_state, MockBroker};

fn assert_gap(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(10),
        "expected a gap of {expected:?}, got {actual:?}"
    );
}

#[tokio::test]
async fn start_connects_and_serves_channels() {
    let broker = MockBroker::new();
    let supervisor = connected_supervisor(&broker, fast_config(2)).await;

    let channel = supervisor.acquire().await.expect("acquire");
    assert!(channel.is_open());
    supervisor.release(channel).await;
    assert_eq!(supervisor.idle_channels(), 1);

    let report = supervisor.health();
    assert!(report.is_healthy);
    assert!(report.component("channel_pool").is_some());

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn repeated_start_is_a_no_op() {
    let broker = MockBroker::new();
    let supervisor = connected_supervisor(&broker, fast_config(2)).await;

    supervisor.start().unwrap();
    supervisor.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(broker.dial_attempts(), 1);
    supervisor.stop().await.unwrap();
}

/// Validates the reconnect backoff sequence for three failed dials.
///
/// # Test Steps
/// 1. Fail the first three dials with a 1s floor and no jitter
/// 2. Wait for the fourth dial to connect
/// 3. Kill the connection and fail one more dial
///
/// Assertions:
/// - Gaps between the first four dials are 1s, 2s, 4s
/// - After a successful dial the next failure waits the 1s floor again
#[tokio::test(start_paused = true)]
async fn dial_backoff_doubles_then_resets_after_success() {
    let broker = MockBroker::new();
    broker.fail_next_dials(3);

    let mut config = fast_config(2);
    config.backoff = ReconnectBackoffConfig::from_millis(1_000, 30_000, 0);
    let supervisor = connected_supervisor(&broker, config).await;

    let times = broker.dial_times();
    assert_eq!(times.len(), 4);
    assert_gap(times[1] - times[0], Duration::from_secs(1));
    assert_gap(times[2] - times[1], Duration::from_secs(2));
    assert_gap(times[3] - times[2], Duration::from_secs(4));
    assert_eq!(supervisor.metrics().snapshot().dial_failures, 3);

    broker.fail_next_dials(1);
    broker.kill_connection();
    assert_eventually_async!(Duration::from_secs(60), async { broker.dial_attempts() >= 6 });
    wait_for_state(&supervisor, SupervisorState::Connected).await;

    let times = broker.dial_times();
    assert_gap(times[5] - times[4], Duration::from_secs(1));
    assert_eq!(supervisor.metrics().snapshot().reconnects, 1);

    supervisor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn acquire_waits_for_first_connection() {
    let broker = MockBroker::new();
    broker.fail_next_dials(2);

    let supervisor = supervisor(&broker, fast_config(2));
    supervisor.start().unwrap();

    let channel = supervisor.acquire().await.expect("acquire after reconnect");
    assert_eq!(broker.dial_attempts(), 3);
    supervisor.release(channel).await;

    supervisor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn acquire_gives_up_after_timeout_without_connection() {
    let broker = MockBroker::new();
    broker.fail_next_dials(u32::MAX);

    let mut config = fast_config(2);
    config.acquire_timeout = Duration::from_millis(500);
    let supervisor = supervisor(&broker, config);
    supervisor.start().unwrap();

    let err = supervisor.acquire().await.unwrap_err();
    assert_eq!(err.kind(), BrokerErrorKind::NoConnection);
    assert_ne!(supervisor.state(), SupervisorState::Connected);

    supervisor.stop().await.unwrap();
}

/// Validates recovery from a broker-initiated connection loss.
///
/// # Test Steps
/// 1. Connect and lease a channel
/// 2. Kill the connection from the broker side
/// 3. Wait for the supervisor to reconnect
///
/// Assertions:
/// - A new pool generation is installed
/// - The old connection is closed and the stale lease is closed on release
#[tokio::test]
async fn reconnects_after_connection_loss() {
    let broker = MockBroker::new();
    let supervisor = connected_supervisor(&broker, fast_config(2)).await;
    let first_generation = supervisor.generation();
    let first_connection = broker.current_connection().unwrap();

    let lease = supervisor.acquire().await.unwrap();
    assert_eq!(lease.generation(), first_generation);

    broker.kill_connection();
    assert_eventually_async!(Duration::from_secs(5), async { broker.connection_count() == 2 });
    wait_for_state(&supervisor, SupervisorState::Connected).await;

    assert!(supervisor.generation() > first_generation);
    assert!(!first_connection.is_open());

    supervisor.release(lease).await;
    assert_eq!(broker.channels()[0].close_calls(), 1);
    assert_eq!(supervisor.idle_channels(), 0);
    assert_eq!(supervisor.metrics().snapshot().reconnects, 1);

    let fresh = supervisor.acquire().await.unwrap();
    assert_ne!(fresh.generation(), first_generation);
    supervisor.release(fresh).await;

    supervisor.stop().await.unwrap();
}

/// Validates the forced-reconnect path for a connection that reports open
/// but refuses to open channels.
///
/// Assertions:
/// - The acquire error is classified as a dead connection
/// - The supervisor closes the connection and dials again
/// - A later acquire succeeds on the new connection
#[tokio::test]
async fn dead_connection_forces_reconnect() {
    let broker = MockBroker::new();
    let supervisor = connected_supervisor(&broker, fast_config(2)).await;
    let dead_generation = supervisor.generation();
    let dead_connection = broker.current_connection().unwrap();

    broker.break_connection_silently();
    let err = supervisor.acquire().await.unwrap_err();
    assert!(err.indicates_dead_connection());
    assert_eq!(supervisor.metrics().snapshot().forced_reconnects, 1);
    assert!(dead_connection.close_calls() >= 1);

    assert_eventually_async!(Duration::from_secs(5), async { broker.connection_count() == 2 });
    let channel = supervisor.acquire().await.expect("acquire on new connection");
    assert!(channel.generation() > dead_generation);
    supervisor.release(channel).await;

    // A report against the retired generation is ignored.
    supervisor
        .report_failure(dead_generation, &BrokerError::ConnectionClosed("late report".into()))
        .await;
    assert_eq!(supervisor.metrics().snapshot().forced_reconnects, 1);

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn warm_up_fills_pool_after_connect() {
    let broker = MockBroker::new();
    let mut config = fast_config(3);
    config.warm_up = true;
    let supervisor = connected_supervisor(&broker, config).await;

    let handle = supervisor.clone();
    assert_eventually_async!(Duration::from_secs(2), async { handle.idle_channels() == 3 });
    assert_eq!(broker.open_channel_count(), 3);

    supervisor.stop().await.unwrap();
    assert_eq!(broker.open_channel_count(), 0);
}

/// Validates idempotent shutdown.
///
/// # Test Steps
/// 1. Connect with warm-up and hold one lease
/// 2. Stop twice
/// 3. Release the lease after shutdown
///
/// Assertions:
/// - Both stops succeed and the state is `Terminated`
/// - Start and acquire report `ShuttingDown` afterwards
/// - No channel or connection is left open
#[tokio::test]
async fn stop_is_idempotent_and_leaks_nothing() {
    let broker = MockBroker::new();
    let mut config = fast_config(2);
    config.warm_up = true;
    let supervisor = connected_supervisor(&broker, config).await;

    let handle = supervisor.clone();
    assert_eventually_async!(Duration::from_secs(2), async { handle.idle_channels() == 2 });
    let lease = supervisor.acquire().await.unwrap();

    supervisor.stop().await.unwrap();
    supervisor.stop().await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Terminated);

    assert!(matches!(supervisor.start(), Err(BrokerError::ShuttingDown)));
    assert!(matches!(supervisor.acquire().await, Err(BrokerError::ShuttingDown)));

    supervisor.release(lease).await;
    assert_eq!(broker.open_channel_count(), 0);
    assert!(!broker.current_connection().unwrap().is_open());
    assert!(supervisor.health_tracker().is_empty());
    assert!(!supervisor.health().is_healthy);
}

#[tokio::test]
async fn stop_before_start_is_safe() {
    let broker = MockBroker::new();
    let supervisor = supervisor(&broker, fast_config(2));

    supervisor.stop().await.unwrap();
    supervisor.stop().await.unwrap();

    assert_eq!(supervisor.state(), SupervisorState::Terminated);
    assert_eq!(broker.dial_attempts(), 0);
    assert!(supervisor.start().is_err());
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_backoff_sleep() {
    let broker = MockBroker::new();
    broker.fail_next_dials(u32::MAX);

    let supervisor = supervisor(&broker, fast_config(2));
    supervisor.start().unwrap();
    wait_for_state(&supervisor, SupervisorState::Connecting).await;

    tokio::time::timeout(Duration::from_secs(2), supervisor.stop())
        .await
        .expect("stop returns promptly")
        .unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Terminated);
}

#[test]
fn rejects_invalid_config() {
    let broker = MockBroker::new();
    let metrics = std::sync::Arc::new(channelog_core::BrokerMetrics::new());

    let zero = fast_config(0);
    let err = channelog_core::ConnectionSupervisor::new(broker.connector(), zero, metrics.clone())
        .unwrap_err();
    assert_eq!(err.kind(), BrokerErrorKind::Config);

    let mut blank = fast_config(2);
    blank.queue_name = "  ".into();
    assert!(channelog_core::ConnectionSupervisor::new(broker.connector(), blank, metrics).is_err());
}
