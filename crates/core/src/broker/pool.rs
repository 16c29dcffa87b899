//! Bounded channel pool.
//!
//! A pool belongs to exactly one connection (or to none, while the supervisor
//! is reconnecting) and is identified by a generation number. Channels are
//! leased by moving a [`PooledChannel`] out of the pool and returned by
//! moving it back in, so a channel can only ever be held by one caller.
//!
//! **Capacity**
//! - At most `capacity` idle channels are retained.
//! - Opens on an empty pool are not capped; surplus channels are closed on
//!   release instead of blocking the releasing caller.
//!
//! **Staleness**
//! - A pooled channel may have been closed by the broker since it was
//!   returned. That is discovered on the next acquire, which closes it and
//!   pops again.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use channelog_common::collections::{BoundedQueue, TryPushError};
use channelog_common::lifecycle::spawn_guarded;
use channelog_domain::PublishRequest;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::BrokerResult;
use super::health::ChannelHealthTracker;
use super::metrics::BrokerMetrics;
use super::ports::{BrokerChannel, BrokerConnection};

static NEXT_CHANNEL_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique channel identity.
///
/// Broker channel numbers are reused across connections, so they are never
/// used to identify a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey(u64);

impl ChannelKey {
    /// Allocate a fresh identity
    pub fn next() -> Self {
        Self(NEXT_CHANNEL_KEY.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// A channel leased from, or idle in, a [`ChannelPool`]
pub struct PooledChannel {
    key: ChannelKey,
    generation: u64,
    channel: Arc<dyn BrokerChannel>,
    closed: Arc<AtomicBool>,
    leased: AtomicBool,
    watcher: CancellationToken,
    tracker: Arc<ChannelHealthTracker>,
    metrics: Arc<BrokerMetrics>,
}

impl PooledChannel {
    pub fn key(&self) -> ChannelKey {
        self.key
    }

    /// Generation of the pool (and connection) this channel was opened on
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn number(&self) -> u16 {
        self.channel.number()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        !self.is_closed() && self.channel.is_open()
    }

    pub async fn publish(&self, request: &PublishRequest) -> BrokerResult<()> {
        self.channel.publish(request).await
    }

    /// Close the channel. Only the first call on any path reaches the broker;
    /// returns whether this call did.
    pub async fn close(&self) -> bool {
        if !self.begin_close() {
            return false;
        }
        if let Err(err) = self.channel.close().await {
            debug!(channel = %self.key, error = %err, "Channel close reported an error");
        }
        true
    }

    fn start_lease(&self) {
        if !self.leased.swap(true, Ordering::AcqRel) {
            self.metrics.record_lease();
        }
    }

    /// Leases end exactly once, whether returned, discarded or dropped.
    fn end_lease(&self) {
        if self.leased.swap(false, Ordering::AcqRel) {
            self.metrics.record_lease_returned();
        }
    }

    fn begin_close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.watcher.cancel();
        self.tracker.take(self.key);
        self.metrics.record_channel_closed();
        true
    }
}

impl fmt::Debug for PooledChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledChannel")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for PooledChannel {
    fn drop(&mut self) {
        self.end_lease();
        if !self.begin_close() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            let channel = Arc::clone(&self.channel);
            spawn_guarded("channel_close_on_drop", async move {
                let _ = channel.close().await;
            });
        } else {
            warn!(channel = %self.key, "Channel dropped outside a runtime; left for the broker to reclaim");
        }
    }
}

/// Idle channels for one connection generation
pub struct ChannelPool {
    generation: u64,
    connection: Option<Arc<dyn BrokerConnection>>,
    idle: BoundedQueue<PooledChannel>,
    queue_name: String,
    tracker: Arc<ChannelHealthTracker>,
    metrics: Arc<BrokerMetrics>,
    cancel: CancellationToken,
}

impl ChannelPool {
    /// Create an empty pool. A pool without a connection only ever reports
    /// "no connection" and closes whatever is released into it.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(
        generation: u64,
        connection: Option<Arc<dyn BrokerConnection>>,
        capacity: usize,
        queue_name: impl Into<String>,
        tracker: Arc<ChannelHealthTracker>,
        metrics: Arc<BrokerMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            generation,
            connection,
            idle: BoundedQueue::new(capacity),
            queue_name: queue_name.into(),
            tracker,
            metrics,
            cancel,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }

    /// Idle channels currently retained
    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }

    /// True once [`drain`](Self::drain) has run
    pub fn is_retired(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The pool's connection, if it is still open
    pub fn live_connection(&self) -> Option<Arc<dyn BrokerConnection>> {
        self.connection.as_ref().filter(|conn| conn.is_open()).map(Arc::clone)
    }

    /// One acquire attempt.
    ///
    /// Pops idle channels until a healthy one is found, then falls back to
    /// opening a new channel. Returns `Ok(None)` when the pool has no live
    /// connection; the caller decides whether to wait.
    ///
    /// # Errors
    /// Channel-open and queue-declare failures are returned unchanged.
    pub async fn acquire(&self) -> BrokerResult<Option<PooledChannel>> {
        while let Some(channel) = self.idle.try_pop() {
            if self.tracker.take(channel.key()) {
                debug!(channel = %channel.key(), "Discarding channel marked bad");
                self.metrics.record_bad_discarded();
                channel.close().await;
                continue;
            }
            if !channel.is_open() {
                debug!(channel = %channel.key(), "Discarding stale pooled channel");
                channel.close().await;
                continue;
            }
            self.metrics.record_pool_hit();
            channel.start_lease();
            return Ok(Some(channel));
        }

        let Some(connection) = self.live_connection() else {
            return Ok(None);
        };
        self.metrics.record_pool_miss();
        let channel = self.open_channel(connection.as_ref()).await?;
        channel.start_lease();
        Ok(Some(channel))
    }

    /// Return a leased channel. Never waits for space: a full pool closes the
    /// channel instead.
    pub async fn release(&self, channel: PooledChannel) {
        channel.end_lease();

        if channel.generation() != self.generation {
            debug!(
                channel = %channel.key(),
                channel_generation = channel.generation(),
                pool_generation = self.generation,
                "Closing channel from a retired pool"
            );
            channel.close().await;
            return;
        }
        if self.tracker.take(channel.key()) {
            debug!(channel = %channel.key(), "Released channel was marked bad; closing");
            self.metrics.record_bad_discarded();
            channel.close().await;
            return;
        }
        if !channel.is_open() {
            channel.close().await;
            return;
        }

        match self.idle.try_push(channel) {
            Ok(()) => self.metrics.record_released_to_pool(),
            Err(TryPushError::Full(channel)) => {
                debug!(channel = %channel.key(), capacity = self.capacity(), "Pool full; closing released channel");
                self.metrics.record_released_overflow();
                channel.close().await;
            }
            Err(TryPushError::Closed(channel)) => {
                channel.close().await;
            }
        }
    }

    /// Close a leased channel without returning it
    pub async fn discard(&self, channel: PooledChannel) {
        channel.end_lease();
        if self.tracker.take(channel.key()) {
            self.metrics.record_bad_discarded();
        }
        channel.close().await;
    }

    /// Fill the pool up to capacity, making at most `capacity` open attempts.
    /// A failed open is skipped unless the connection is gone; returns the
    /// number of channels added.
    pub async fn warm_up(&self) -> usize {
        let Some(connection) = self.live_connection() else {
            return 0;
        };

        let mut opened = 0_usize;
        for _ in 0..self.capacity() {
            if self.idle.is_full() || self.cancel.is_cancelled() {
                break;
            }
            match self.open_channel(connection.as_ref()).await {
                Ok(channel) => match self.idle.try_push(channel) {
                    Ok(()) => opened = opened.saturating_add(1),
                    Err(rejected) => {
                        rejected.into_inner().close().await;
                        break;
                    }
                },
                Err(err) if err.indicates_dead_connection() || !connection.is_open() => {
                    warn!(generation = self.generation, opened, error = %err, "Pool warm-up stopped early");
                    break;
                }
                Err(err) => {
                    warn!(generation = self.generation, error = %err, "Warm-up channel failed; continuing");
                }
            }
        }

        info!(generation = self.generation, opened, idle = self.idle_len(), "Channel pool warmed up");
        opened
    }

    /// Retire the pool: stop its watchers and warm-up, refuse further
    /// releases and close every idle channel. Returns how many were closed.
    pub async fn drain(&self) -> usize {
        self.cancel.cancel();
        let channels = self.idle.close_and_drain();
        let count = channels.len();
        for channel in channels {
            channel.close().await;
        }
        if count > 0 {
            debug!(generation = self.generation, closed = count, "Drained channel pool");
        }
        count
    }

    async fn open_channel(&self, connection: &dyn BrokerConnection) -> BrokerResult<PooledChannel> {
        let channel: Arc<dyn BrokerChannel> = Arc::from(connection.open_channel().await?);
        self.metrics.record_channel_opened();

        let key = ChannelKey::next();
        let closed = Arc::new(AtomicBool::new(false));
        let notification = channel.notify_close();
        let pooled = PooledChannel {
            key,
            generation: self.generation,
            channel,
            closed: Arc::clone(&closed),
            leased: AtomicBool::new(false),
            watcher: self.cancel.child_token(),
            tracker: Arc::clone(&self.tracker),
            metrics: Arc::clone(&self.metrics),
        };

        if let Err(err) = pooled.channel.declare_queue(&self.queue_name).await {
            warn!(channel = %key, queue = %self.queue_name, error = %err, "Queue declare failed; closing channel");
            pooled.close().await;
            return Err(err);
        }

        self.tracker.watch(key, notification, closed, pooled.watcher.clone());
        debug!(channel = %key, number = pooled.number(), generation = self.generation, "Opened channel");
        Ok(pooled)
    }
}

impl fmt::Debug for ChannelPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPool")
            .field("generation", &self.generation)
            .field("connected", &self.connection.is_some())
            .field("idle", &self.idle_len())
            .field("capacity", &self.capacity())
            .field("retired", &self.is_retired())
            .finish()
    }
}
