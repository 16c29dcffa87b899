//! # Channelog Core
//!
//! Broker-agnostic publishing logic - no broker client dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for connecting to a message broker
//! - The channel pool, its health tracker and the connection supervisor
//! - The publish coordinator and the task publishing service
//!
//! ## Architecture Principles
//! - Only depends on `channelog-common` and `channelog-domain`
//! - No AMQP client code; adapters live in `channelog-infra`
//! - All broker access goes through the traits in [`broker::ports`]

pub mod broker;
pub mod task;

pub use broker::check::check_health;
pub use broker::error::{BrokerError, BrokerErrorKind, BrokerResult};
pub use broker::health::ChannelHealthTracker;
pub use broker::metrics::{BrokerMetrics, BrokerMetricsSnapshot};
pub use broker::pool::{ChannelKey, ChannelPool, PooledChannel};
pub use broker::ports::{BrokerChannel, BrokerConnection, BrokerConnector, CloseNotification};
pub use broker::publisher::PublishCoordinator;
pub use broker::supervisor::{ConnectionSupervisor, SupervisorConfig, SupervisorState};
pub use task::TaskPublisher;
