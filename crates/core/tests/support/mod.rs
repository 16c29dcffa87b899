//! Shared test helpers for `channelog-core` integration tests.
//!
//! Each integration test binary uses a different subset of these helpers.
#![allow(dead_code)]

pub mod mock_broker;

use std::sync::Arc;
use std::time::Duration;

use channelog_common::resilience::ReconnectBackoffConfig;
use channelog_core::{
    BrokerMetrics, ChannelHealthTracker, ChannelPool, ConnectionSupervisor, SupervisorConfig,
    SupervisorState,
};
pub use mock_broker::{MockBroker, MockConnector};
use tokio_util::sync::CancellationToken;

pub const QUEUE: &str = "admission-events";

/// Supervisor config with short, jitter-free timings and no warm-up
pub fn fast_config(pool_capacity: usize) -> SupervisorConfig {
    SupervisorConfig {
        queue_name: QUEUE.to_string(),
        pool_capacity,
        connect_timeout: Duration::from_secs(1),
        backoff: ReconnectBackoffConfig::from_millis(50, 400, 0),
        acquire_retry_delay: Duration::from_millis(10),
        acquire_timeout: Duration::from_secs(5),
        warm_up: false,
        join_timeout: Duration::from_secs(1),
    }
}

pub fn supervisor(broker: &MockBroker, config: SupervisorConfig) -> ConnectionSupervisor {
    ConnectionSupervisor::new(broker.connector(), config, Arc::new(BrokerMetrics::new()))
        .expect("valid supervisor config")
}

/// Start a supervisor and wait until it is connected
pub async fn connected_supervisor(broker: &MockBroker, config: SupervisorConfig) -> ConnectionSupervisor {
    let supervisor = supervisor(broker, config);
    supervisor.start().expect("start supervisor");
    wait_for_state(&supervisor, SupervisorState::Connected).await;
    supervisor
}

pub async fn wait_for_state(supervisor: &ConnectionSupervisor, state: SupervisorState) {
    let mut rx = supervisor.subscribe_state();
    tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|current| *current == state))
        .await
        .unwrap_or_else(|_| panic!("supervisor never reached {state}"))
        .expect("state channel closed");
}

/// Pool wired to a fresh mock connection
pub struct PoolFixture {
    pub broker: MockBroker,
    pub pool: ChannelPool,
    pub tracker: Arc<ChannelHealthTracker>,
    pub metrics: Arc<BrokerMetrics>,
}

pub async fn pool_fixture(capacity: usize) -> PoolFixture {
    use channelog_core::BrokerConnector;

    let broker = MockBroker::new();
    let connection = broker.connector().connect().await.expect("mock dial");
    let tracker = Arc::new(ChannelHealthTracker::new());
    let metrics = Arc::new(BrokerMetrics::new());
    let pool = ChannelPool::new(
        1,
        Some(connection),
        capacity,
        QUEUE,
        Arc::clone(&tracker),
        Arc::clone(&metrics),
        CancellationToken::new(),
    );
    PoolFixture { broker, pool, tracker, metrics }
}
