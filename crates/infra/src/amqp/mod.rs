//! AMQP 0-9-1 adapter on `lapin`
//!
//! Implements the broker ports from `channelog-core`. Connection and channel
//! errors reported by the client are forwarded to close subscribers as
//! classified [`channelog_core::BrokerError`]s.

mod channel;
mod connection;
mod connector;
mod errors;

pub use channel::LapinChannel;
pub use connection::LapinConnection;
pub use connector::LapinConnector;
