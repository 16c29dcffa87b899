//! Connection supervisor.
//!
//! Owns the single broker connection and the active [`ChannelPool`]. A
//! background loop dials with jittered exponential backoff, installs a fresh
//! pool on every successful dial, warms it in a separate task, and waits for
//! the connection to be lost or for shutdown.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> (lost) -> Disconnected -> Connecting
//!                     |             |
//!                     +-------------+--> Draining -> Terminated   (stop)
//! ```
//!
//! The connection and pool live together in one session behind a
//! `parking_lot::RwLock`. The lock is only held to clone or swap the session,
//! never across an await, so every acquire sees either the old pool or the
//! new one in full.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use channelog_common::lifecycle::{spawn_guarded, ComponentHealth, HealthReport};
use channelog_common::resilience::{ReconnectBackoff, ReconnectBackoffConfig};
use channelog_domain::{constants, BrokerConfig};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::error::{BrokerError, BrokerResult};
use super::health::ChannelHealthTracker;
use super::metrics::BrokerMetrics;
use super::pool::{ChannelPool, PooledChannel};
use super::ports::{BrokerConnection, BrokerConnector};

/// Lifecycle state of a [`ConnectionSupervisor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorState {
    /// No connection; the loop is not running or is about to dial
    Disconnected,
    /// Dialing, or sleeping between dial attempts
    Connecting,
    Connected,
    /// `stop` is tearing down the connection and pool
    Draining,
    Terminated,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Draining => write!(f, "draining"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Tunables for [`ConnectionSupervisor`]
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Queue declared on every channel before it is handed out
    pub queue_name: String,
    pub pool_capacity: usize,
    pub connect_timeout: Duration,
    pub backoff: ReconnectBackoffConfig,
    pub acquire_retry_delay: Duration,
    pub acquire_timeout: Duration,
    pub warm_up: bool,
    /// Join timeout for the reconnect loop when stopping
    pub join_timeout: Duration,
}

impl SupervisorConfig {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            pool_capacity: constants::DEFAULT_MAX_CHANNEL_POOL,
            connect_timeout: Duration::from_millis(constants::DEFAULT_CONNECT_TIMEOUT_MS),
            backoff: ReconnectBackoffConfig::default(),
            acquire_retry_delay: Duration::from_millis(constants::DEFAULT_ACQUIRE_RETRY_DELAY_MS),
            acquire_timeout: Duration::from_millis(constants::DEFAULT_ACQUIRE_TIMEOUT_MS),
            warm_up: true,
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&BrokerConfig> for SupervisorConfig {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            queue_name: config.queue_name.clone(),
            pool_capacity: config.max_channel_pool,
            connect_timeout: config.connect_timeout(),
            backoff: ReconnectBackoffConfig::from_millis(
                config.backoff_floor_ms,
                config.backoff_max_ms,
                config.backoff_jitter_ms,
            ),
            acquire_retry_delay: config.acquire_retry_delay(),
            acquire_timeout: config.acquire_timeout(),
            warm_up: config.warm_up,
            join_timeout: Duration::from_secs(5),
        }
    }
}

struct Session {
    connection: Option<Arc<dyn BrokerConnection>>,
    pool: Arc<ChannelPool>,
}

struct Inner {
    connector: Arc<dyn BrokerConnector>,
    config: SupervisorConfig,
    session: RwLock<Session>,
    tracker: Arc<ChannelHealthTracker>,
    metrics: Arc<BrokerMetrics>,
    state: watch::Sender<SupervisorState>,
    cancel: CancellationToken,
    generation: AtomicU64,
    started: AtomicBool,
    stopped: AtomicBool,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the supervisor; clones share the same connection and pool
#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<Inner>,
}

impl ConnectionSupervisor {
    /// Create a supervisor. Nothing is dialed until [`start`](Self::start).
    ///
    /// # Errors
    /// Returns `BrokerError::Config` for a zero pool capacity, an empty
    /// queue name or an invalid backoff range.
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        config: SupervisorConfig,
        metrics: Arc<BrokerMetrics>,
    ) -> BrokerResult<Self> {
        if config.pool_capacity == 0 {
            return Err(BrokerError::Config("pool capacity must be greater than zero".into()));
        }
        if config.queue_name.trim().is_empty() {
            return Err(BrokerError::Config("queue name must not be empty".into()));
        }
        config.backoff.validate().map_err(|e| BrokerError::Config(e.to_string()))?;

        let tracker = Arc::new(ChannelHealthTracker::new());
        let cancel = CancellationToken::new();
        let pool = Arc::new(ChannelPool::new(
            0,
            None,
            config.pool_capacity,
            config.queue_name.clone(),
            Arc::clone(&tracker),
            Arc::clone(&metrics),
            cancel.child_token(),
        ));
        let (state, _) = watch::channel(SupervisorState::Disconnected);

        Ok(Self {
            inner: Arc::new(Inner {
                connector,
                config,
                session: RwLock::new(Session { connection: None, pool }),
                tracker,
                metrics,
                state,
                cancel,
                generation: AtomicU64::new(0),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                loop_handle: Mutex::new(None),
            }),
        })
    }

    /// Spawn the reconnect loop. Calling it again while running is a no-op.
    ///
    /// # Errors
    /// Returns `BrokerError::ShuttingDown` after [`stop`](Self::stop).
    #[instrument(skip(self), fields(endpoint = %self.inner.connector.endpoint()))]
    pub fn start(&self) -> BrokerResult<()> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(BrokerError::ShuttingDown);
        }
        if self.inner.started.swap(true, Ordering::AcqRel) {
            debug!("Connection supervisor already started");
            return Ok(());
        }

        info!(pool_capacity = self.inner.config.pool_capacity, "Starting connection supervisor");
        let inner = Arc::clone(&self.inner);
        let handle = spawn_guarded("reconnect_loop", Inner::reconnect_loop(inner));
        *self.inner.loop_handle.lock() = Some(handle);
        Ok(())
    }

    /// Stop the loop, close the connection and every pooled channel.
    ///
    /// Safe to call more than once and before [`start`](Self::start).
    /// Channels still leased are closed when they are released.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> BrokerResult<()> {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            debug!("Connection supervisor already stopped");
            return Ok(());
        }

        info!("Stopping connection supervisor");
        self.inner.set_state(SupervisorState::Draining);
        self.inner.cancel.cancel();

        let handle = self.inner.loop_handle.lock().take();
        if let Some(handle) = handle {
            let join_timeout = self.inner.config.join_timeout;
            match tokio::time::timeout(join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Reconnect loop task failed"),
                Err(_) => warn!(
                    timeout_ms = join_timeout.as_millis() as u64,
                    "Reconnect loop did not finish within timeout"
                ),
            }
        }

        let retired = self.inner.swap_session(None);
        let closed = retired.pool.drain().await;
        if let Some(connection) = retired.connection {
            if let Err(err) = connection.close().await {
                debug!(error = %err, "Connection close during shutdown reported an error");
            }
        }

        self.inner.set_state(SupervisorState::Terminated);
        info!(closed_channels = closed, "Connection supervisor stopped");
        Ok(())
    }

    /// Lease a channel from the current pool.
    ///
    /// While no connection is live this sleeps `acquire_retry_delay` between
    /// attempts, up to `acquire_timeout`.
    ///
    /// # Errors
    /// - `ShuttingDown` once [`stop`](Self::stop) has been called
    /// - `NoConnection` when the deadline passes without a connection
    /// - channel-open and queue-declare failures from the pool
    pub async fn acquire(&self) -> BrokerResult<PooledChannel> {
        let started = Instant::now();
        let deadline = started + self.inner.config.acquire_timeout;

        loop {
            if self.inner.cancel.is_cancelled() {
                return Err(BrokerError::ShuttingDown);
            }

            let pool = self.inner.current_pool();
            match pool.acquire().await {
                Ok(Some(channel)) => return Ok(channel),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return Err(BrokerError::NoConnection { waited: started.elapsed() });
                    }
                    debug!(generation = pool.generation(), "No live connection; waiting to acquire");
                    tokio::select! {
                        () = self.inner.cancel.cancelled() => return Err(BrokerError::ShuttingDown),
                        () = tokio::time::sleep(self.inner.config.acquire_retry_delay) => {}
                    }
                }
                Err(err) => {
                    if err.indicates_dead_connection() {
                        self.inner.force_reconnect(pool.generation(), &err).await;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Return a leased channel to the current pool
    pub async fn release(&self, channel: PooledChannel) {
        self.inner.current_pool().release(channel).await;
    }

    /// Close a leased channel instead of returning it
    pub async fn discard(&self, channel: PooledChannel) {
        self.inner.current_pool().discard(channel).await;
    }

    /// Recycle the connection of `generation` if `err` shows it is dead.
    ///
    /// Closing an already-closed connection is harmless, so concurrent
    /// callers may all report the same failure.
    pub async fn report_failure(&self, generation: u64, err: &BrokerError) {
        if err.indicates_dead_connection() {
            self.inner.force_reconnect(generation, err).await;
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.inner.state.subscribe()
    }

    /// Token cancelled by [`stop`](Self::stop)
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn health_tracker(&self) -> Arc<ChannelHealthTracker> {
        Arc::clone(&self.inner.tracker)
    }

    /// Idle channels in the current pool
    pub fn idle_channels(&self) -> usize {
        self.inner.current_pool().idle_len()
    }

    /// Generation of the current pool; increments on every swap
    pub fn generation(&self) -> u64 {
        self.inner.current_pool().generation()
    }

    /// Liveness summary for probes
    pub fn health(&self) -> HealthReport {
        let state = self.state();
        let pool = self.inner.current_pool();

        let connection = if state == SupervisorState::Connected {
            ComponentHealth::healthy("broker_connection")
        } else {
            ComponentHealth::unhealthy("broker_connection", format!("state is {state}"))
        };
        let pool_detail = format!(
            "idle={} capacity={} leased={} generation={}",
            pool.idle_len(),
            pool.capacity(),
            self.inner.metrics.leased(),
            pool.generation()
        );
        let bad_detail = format!("{} awaiting discard", self.inner.tracker.len());

        HealthReport::new()
            .with_component(connection)
            .with_component(ComponentHealth::healthy("channel_pool").with_message(pool_detail))
            .with_component(ComponentHealth::healthy("bad_channels").with_message(bad_detail))
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn set_state(&self, state: SupervisorState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Supervisor state changed");
        }
    }

    fn current_pool(&self) -> Arc<ChannelPool> {
        Arc::clone(&self.session.read().pool)
    }

    /// Install a new session and return the one it replaced
    fn swap_session(&self, connection: Option<Arc<dyn BrokerConnection>>) -> Session {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        let pool = Arc::new(ChannelPool::new(
            generation,
            connection.clone(),
            self.config.pool_capacity,
            self.config.queue_name.clone(),
            Arc::clone(&self.tracker),
            Arc::clone(&self.metrics),
            self.cancel.child_token(),
        ));
        let mut session = self.session.write();
        std::mem::replace(&mut *session, Session { connection, pool })
    }

    /// Replace the session of `generation` with a disconnected one. Returns
    /// `None` if that session was already replaced.
    fn retire_generation(&self, generation: u64) -> Option<Session> {
        let next = self.generation.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        let pool = Arc::new(ChannelPool::new(
            next,
            None,
            self.config.pool_capacity,
            self.config.queue_name.clone(),
            Arc::clone(&self.tracker),
            Arc::clone(&self.metrics),
            self.cancel.child_token(),
        ));
        let mut session = self.session.write();
        if session.pool.generation() != generation {
            return None;
        }
        Some(std::mem::replace(&mut *session, Session { connection: None, pool }))
    }

    async fn teardown(session: Session) {
        let closed = session.pool.drain().await;
        if let Some(connection) = session.connection {
            if let Err(err) = connection.close().await {
                debug!(error = %err, "Closing lost connection reported an error");
            }
        }
        debug!(generation = session.pool.generation(), closed_channels = closed, "Tore down session");
    }

    /// Close the connection of `generation`; the reconnect loop then observes
    /// the loss through the connection's close notification
    async fn force_reconnect(&self, generation: u64, cause: &BrokerError) {
        let connection = {
            let session = self.session.read();
            if session.pool.generation() != generation {
                return;
            }
            session.connection.clone()
        };
        let Some(connection) = connection else {
            return;
        };

        warn!(generation, error = %cause, "Connection reported dead; forcing reconnect");
        self.metrics.record_forced_reconnect();
        if let Err(err) = connection.close().await {
            debug!(error = %err, "Forced close of dead connection reported an error");
        }
    }

    async fn reconnect_loop(self: Arc<Self>) {
        let mut backoff = ReconnectBackoff::new(self.config.backoff);
        let mut connected_before = false;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.set_state(SupervisorState::Connecting);

            let dial = tokio::select! {
                () = self.cancel.cancelled() => break,
                dial = tokio::time::timeout(self.config.connect_timeout, self.connector.connect()) => dial,
            };
            let outcome = match dial {
                Ok(result) => result,
                Err(_) => Err(BrokerError::Timeout {
                    operation: "broker dial",
                    after: self.config.connect_timeout,
                }),
            };

            let connection = match outcome {
                Ok(connection) => connection,
                Err(err) => {
                    self.metrics.record_dial_failure();
                    let delay = backoff.next_delay();
                    error!(
                        error = %err,
                        attempt = backoff.consecutive_failures(),
                        retry_in_ms = delay.as_millis() as u64,
                        "Failed to connect to broker"
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => continue,
                    }
                }
            };

            backoff.reset();
            if connected_before {
                self.metrics.record_reconnect();
            }
            connected_before = true;

            let lost = connection.notify_close();
            let previous = self.swap_session(Some(Arc::clone(&connection)));
            Self::teardown(previous).await;
            let pool = self.current_pool();
            let generation = pool.generation();

            self.set_state(SupervisorState::Connected);
            info!(
                endpoint = %self.connector.endpoint(),
                generation,
                pool_capacity = pool.capacity(),
                "Connected to broker; channel pool initialized"
            );

            if self.config.warm_up {
                spawn_guarded("pool_warm_up", async move {
                    pool.warm_up().await;
                });
            }

            tokio::select! {
                () = self.cancel.cancelled() => break,
                reason = lost => match reason {
                    Ok(err) => warn!(generation, error = %err, "Broker connection lost"),
                    Err(_) => warn!(generation, "Broker connection closed"),
                },
            }

            if let Some(session) = self.retire_generation(generation) {
                Self::teardown(session).await;
            }
            self.set_state(SupervisorState::Disconnected);
        }

        debug!("Reconnect loop exited");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if !self.stopped.load(Ordering::Acquire) && self.started.load(Ordering::Acquire) {
            warn!("ConnectionSupervisor dropped while running; cancelling tasks");
        }
        self.cancel.cancel();
    }
}
