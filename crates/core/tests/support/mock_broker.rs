//! In-memory broker implementing the core ports
//!
//! Supports fault injection for every failure class the supervisor, pool and
//! coordinator handle: dial failures, channel-open and queue-declare
//! failures, publish failures and delays, broker-initiated channel and
//! connection closes, and a connection that silently stops working.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use channelog_core::{
    BrokerChannel, BrokerConnection, BrokerConnector, BrokerError, BrokerResult, CloseNotification,
};
use channelog_domain::PublishRequest;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// A message the broker accepted
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub channel_id: u64,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub content_encoding: Option<String>,
    pub message_id: Option<String>,
}

/// Every publish call, successful or not
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishAttempt {
    pub channel_id: u64,
    pub succeeded: bool,
}

#[derive(Default)]
struct Faults {
    dials: u32,
    channel_opens: u32,
    declares: u32,
    publishes: VecDeque<BrokerError>,
    publish_delay: Option<Duration>,
}

#[derive(Default)]
struct BrokerState {
    faults: Faults,
    dial_times: Vec<Instant>,
    connections: Vec<Arc<ConnectionState>>,
    channels: Vec<Arc<ChannelState>>,
    published: Vec<PublishedMessage>,
    attempts: Vec<PublishAttempt>,
    declared: Vec<String>,
}

/// Shared handle to the fake broker; clones observe the same state
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<BrokerState>>,
    next_channel_id: Arc<AtomicU64>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<MockConnector> {
        Arc::new(MockConnector { broker: self.clone() })
    }

    pub fn fail_next_dials(&self, count: u32) {
        self.state.lock().faults.dials = count;
    }

    pub fn fail_next_channel_opens(&self, count: u32) {
        self.state.lock().faults.channel_opens = count;
    }

    pub fn fail_next_declares(&self, count: u32) {
        self.state.lock().faults.declares = count;
    }

    /// Queue `count` publish failures of the given error
    pub fn fail_next_publishes(&self, count: u32, error: BrokerError) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.faults.publishes.push_back(error.clone());
        }
    }

    pub fn set_publish_delay(&self, delay: Duration) {
        self.state.lock().faults.publish_delay = Some(delay);
    }

    pub fn dial_attempts(&self) -> usize {
        self.state.lock().dial_times.len()
    }

    /// Instants at which each dial was attempted
    pub fn dial_times(&self) -> Vec<Instant> {
        self.state.lock().dial_times.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn current_connection(&self) -> Option<Arc<ConnectionState>> {
        self.state.lock().connections.last().cloned()
    }

    /// Channels ever opened, in open order
    pub fn channels(&self) -> Vec<Arc<ChannelState>> {
        self.state.lock().channels.clone()
    }

    pub fn channel(&self, id: u64) -> Option<Arc<ChannelState>> {
        self.state.lock().channels.iter().find(|c| c.id == id).cloned()
    }

    /// Channels the broker still considers open
    pub fn open_channel_count(&self) -> usize {
        self.state.lock().channels.iter().filter(|c| c.open.load(Ordering::SeqCst)).count()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().published.clone()
    }

    pub fn publish_attempts(&self) -> Vec<PublishAttempt> {
        self.state.lock().attempts.clone()
    }

    pub fn declared_queues(&self) -> Vec<String> {
        self.state.lock().declared.clone()
    }

    /// Broker-initiated loss of the current connection and all its channels
    pub fn kill_connection(&self) {
        if let Some(connection) = self.current_connection() {
            connection.fail(BrokerError::ConnectionClosed("CONNECTION_FORCED - broker forced close".into()));
        }
    }

    /// Make the current connection report open while refusing every
    /// operation, without sending a close notification
    pub fn break_connection_silently(&self) {
        if let Some(connection) = self.current_connection() {
            connection.silently_dead.store(true, Ordering::SeqCst);
        }
    }

    /// Broker-initiated close of one channel
    pub fn close_channel_from_broker(&self, id: u64) {
        if let Some(channel) = self.channel(id) {
            channel.fail(BrokerError::ChannelClosed("PRECONDITION_FAILED - channel closed by broker".into()));
        }
    }
}

/// Dials a [`MockBroker`]
pub struct MockConnector {
    broker: MockBroker,
}

#[async_trait]
impl BrokerConnector for MockConnector {
    async fn connect(&self) -> BrokerResult<Arc<dyn BrokerConnection>> {
        let mut state = self.broker.state.lock();
        state.dial_times.push(Instant::now());
        if state.faults.dials > 0 {
            state.faults.dials -= 1;
            return Err(BrokerError::Dial("connection refused".into()));
        }

        let connection = Arc::new(ConnectionState {
            open: AtomicBool::new(true),
            silently_dead: AtomicBool::new(false),
            close_calls: AtomicU32::new(0),
            notifiers: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
        });
        state.connections.push(Arc::clone(&connection));
        Ok(Arc::new(MockConnection { state: connection, broker: self.broker.clone() }))
    }

    fn endpoint(&self) -> String {
        "amqp://mock:5672/%2f".to_string()
    }
}

/// Broker-side view of a connection
pub struct ConnectionState {
    open: AtomicBool,
    silently_dead: AtomicBool,
    close_calls: AtomicU32,
    notifiers: Mutex<Vec<oneshot::Sender<BrokerError>>>,
    channels: Mutex<Vec<Arc<ChannelState>>>,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn fail(&self, reason: BrokerError) {
        self.open.store(false, Ordering::SeqCst);
        for channel in self.channels.lock().iter() {
            channel.fail(reason.clone());
        }
        for notifier in self.notifiers.lock().drain(..) {
            let _ = notifier.send(reason.clone());
        }
    }

    fn shutdown_locally(&self) {
        self.open.store(false, Ordering::SeqCst);
        for channel in self.channels.lock().iter() {
            channel.shutdown_locally();
        }
        self.notifiers.lock().clear();
    }
}

struct MockConnection {
    state: Arc<ConnectionState>,
    broker: MockBroker,
}

#[async_trait]
impl BrokerConnection for MockConnection {
    async fn open_channel(&self) -> BrokerResult<Box<dyn BrokerChannel>> {
        if !self.state.is_open() || self.state.silently_dead.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionClosed("channel/connection is not open".into()));
        }
        {
            let mut broker = self.broker.state.lock();
            if broker.faults.channel_opens > 0 {
                broker.faults.channel_opens -= 1;
                return Err(BrokerError::ChannelOpen("NOT_ALLOWED - channel_max reached".into()));
            }
        }

        let id = self.broker.next_channel_id.fetch_add(1, Ordering::SeqCst) + 1;
        let channel = Arc::new(ChannelState {
            id,
            open: AtomicBool::new(true),
            close_calls: AtomicU32::new(0),
            notifiers: Mutex::new(Vec::new()),
        });
        self.state.channels.lock().push(Arc::clone(&channel));
        self.broker.state.lock().channels.push(Arc::clone(&channel));

        Ok(Box::new(MockChannel {
            state: channel,
            connection: Arc::clone(&self.state),
            broker: self.broker.clone(),
        }))
    }

    async fn close(&self) -> BrokerResult<()> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.shutdown_locally();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn notify_close(&self) -> CloseNotification {
        let (tx, rx) = oneshot::channel();
        if self.state.is_open() {
            self.state.notifiers.lock().push(tx);
        }
        rx
    }
}

/// Broker-side view of a channel
pub struct ChannelState {
    pub id: u64,
    open: AtomicBool,
    close_calls: AtomicU32,
    notifiers: Mutex<Vec<oneshot::Sender<BrokerError>>>,
}

impl ChannelState {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of local `close` calls the channel received
    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn fail(&self, reason: BrokerError) {
        self.open.store(false, Ordering::SeqCst);
        for notifier in self.notifiers.lock().drain(..) {
            let _ = notifier.send(reason.clone());
        }
    }

    fn shutdown_locally(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.notifiers.lock().clear();
    }
}

struct MockChannel {
    state: Arc<ChannelState>,
    connection: Arc<ConnectionState>,
    broker: MockBroker,
}

impl MockChannel {
    fn ensure_usable(&self) -> BrokerResult<()> {
        if !self.connection.is_open() || self.connection.silently_dead.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionClosed("channel/connection is not open".into()));
        }
        if !self.state.is_open() {
            return Err(BrokerError::ChannelClosed("channel is not open".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerChannel for MockChannel {
    async fn declare_queue(&self, queue: &str) -> BrokerResult<()> {
        self.ensure_usable()?;
        let mut broker = self.broker.state.lock();
        if broker.faults.declares > 0 {
            broker.faults.declares -= 1;
            return Err(BrokerError::queue_declare(queue, "PRECONDITION_FAILED - inequivalent arg 'durable'"));
        }
        broker.declared.push(queue.to_string());
        Ok(())
    }

    async fn publish(&self, request: &PublishRequest) -> BrokerResult<()> {
        let delay = self.broker.state.lock().faults.publish_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.ensure_usable().and_then(|()| {
            match self.broker.state.lock().faults.publishes.pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        });

        let mut broker = self.broker.state.lock();
        broker.attempts.push(PublishAttempt { channel_id: self.state.id, succeeded: outcome.is_ok() });
        if outcome.is_ok() {
            broker.published.push(PublishedMessage {
                channel_id: self.state.id,
                routing_key: request.routing_key().to_string(),
                body: request.body().to_vec(),
                content_encoding: request.content_encoding().map(str::to_string),
                message_id: request.message_id().map(str::to_string),
            });
        }
        outcome
    }

    async fn close(&self) -> BrokerResult<()> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.shutdown_locally();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_open() && self.connection.is_open()
    }

    fn notify_close(&self) -> CloseNotification {
        let (tx, rx) = oneshot::channel();
        if self.state.is_open() {
            self.state.notifiers.lock().push(tx);
        }
        rx
    }

    fn number(&self) -> u16 {
        u16::try_from(self.state.id % u64::from(u16::MAX)).unwrap_or(0)
    }
}
