//! Broker pool metrics
//!
//! Lock-free counters shared by the supervisor, the pool and the publish
//! coordinator.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for channel and connection lifecycle events
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    /// Channels opened on any connection (warm-up and on-demand)
    pub channels_opened: AtomicU64,
    /// Channels the core closed
    pub channels_closed: AtomicU64,
    /// Acquires served from the idle pool
    pub pool_hits: AtomicU64,
    /// Acquires that had to open a channel
    pub pool_misses: AtomicU64,
    pub released_to_pool: AtomicU64,
    /// Releases closed because the pool was full
    pub released_overflow: AtomicU64,
    /// Channels discarded because the broker had closed them
    pub bad_discarded: AtomicU64,
    /// Channels currently leased to callers
    leased: AtomicU64,
    pub publish_attempts: AtomicU64,
    pub publish_failures: AtomicU64,
    pub publish_exhausted: AtomicU64,
    pub dial_failures: AtomicU64,
    /// Successful dials after the first one
    pub reconnects: AtomicU64,
    pub forced_reconnects: AtomicU64,
}

impl BrokerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_channel_opened(&self) {
        self.channels_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_channel_closed(&self) {
        self.channels_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pool_hit(&self) {
        self.pool_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pool_miss(&self) {
        self.pool_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released_to_pool(&self) {
        self.released_to_pool.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released_overflow(&self) {
        self.released_overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bad_discarded(&self) {
        self.bad_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lease(&self) {
        self.leased.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero
    pub fn record_lease_returned(&self) {
        let _ = self
            .leased
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));
    }

    pub fn leased(&self) -> u64 {
        self.leased.load(Ordering::Relaxed)
    }

    pub fn record_publish_attempt(&self) {
        self.publish_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_exhausted(&self) {
        self.publish_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dial_failure(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forced_reconnect(&self) {
        self.forced_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> BrokerMetricsSnapshot {
        BrokerMetricsSnapshot {
            channels_opened: self.channels_opened.load(Ordering::Relaxed),
            channels_closed: self.channels_closed.load(Ordering::Relaxed),
            pool_hits: self.pool_hits.load(Ordering::Relaxed),
            pool_misses: self.pool_misses.load(Ordering::Relaxed),
            released_to_pool: self.released_to_pool.load(Ordering::Relaxed),
            released_overflow: self.released_overflow.load(Ordering::Relaxed),
            bad_discarded: self.bad_discarded.load(Ordering::Relaxed),
            leased: self.leased.load(Ordering::Relaxed),
            publish_attempts: self.publish_attempts.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            publish_exhausted: self.publish_exhausted.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            forced_reconnects: self.forced_reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`BrokerMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BrokerMetricsSnapshot {
    pub channels_opened: u64,
    pub channels_closed: u64,
    pub pool_hits: u64,
    pub pool_misses: u64,
    pub released_to_pool: u64,
    pub released_overflow: u64,
    pub bad_discarded: u64,
    pub leased: u64,
    pub publish_attempts: u64,
    pub publish_failures: u64,
    pub publish_exhausted: u64,
    pub dial_failures: u64,
    pub reconnects: u64,
    pub forced_reconnects: u64,
}
