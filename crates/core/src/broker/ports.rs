//! Port interfaces for broker access
//!
//! These traits define the boundary between the pooling logic and a concrete
//! broker client. Implementations must be cheap to call concurrently; the
//! core never holds a lock across any of these calls.

use std::sync::Arc;

use async_trait::async_trait;
use channelog_domain::PublishRequest;
use tokio::sync::oneshot;

use super::error::{BrokerError, BrokerResult};

/// Fires once with the reason when the broker closes a connection or channel.
///
/// A dropped sender means the resource was closed locally: connection
/// watchers treat that as a loss, channel watchers ignore it.
pub type CloseNotification = oneshot::Receiver<BrokerError>;

/// Dials the broker
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Make one connection attempt
    async fn connect(&self) -> BrokerResult<Arc<dyn BrokerConnection>>;

    /// Endpoint description safe to log (no credentials)
    fn endpoint(&self) -> String;
}

/// A live broker session
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Open a new multiplexed channel on this connection
    async fn open_channel(&self) -> BrokerResult<Box<dyn BrokerChannel>>;

    /// Close the connection; closing an already-closed connection is `Ok`
    async fn close(&self) -> BrokerResult<()>;

    fn is_open(&self) -> bool;

    /// Subscribe to the loss of this connection
    fn notify_close(&self) -> CloseNotification;
}

/// A channel used for one operation at a time
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare `queue` durable, non-exclusive and non-auto-delete
    async fn declare_queue(&self, queue: &str) -> BrokerResult<()>;

    async fn publish(&self, request: &PublishRequest) -> BrokerResult<()>;

    /// Close the channel; closing an already-closed channel is `Ok`
    async fn close(&self) -> BrokerResult<()>;

    fn is_open(&self) -> bool;

    /// Subscribe to a broker-initiated close of this channel
    fn notify_close(&self) -> CloseNotification;

    /// Broker-side channel number, for logs only
    fn number(&self) -> u16;
}
