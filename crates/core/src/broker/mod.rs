//! Pooled, self-healing broker access
//!
//! - [`supervisor`] owns the single live connection and rebuilds the pool on
//!   every reconnect
//! - [`pool`] leases channels to publishers and reclaims them
//! - [`health`] turns asynchronous broker-side channel closures into a
//!   "do not reuse" set
//! - [`publisher`] publishes one message with bounded retries

pub mod check;
pub mod error;
pub mod health;
pub mod metrics;
pub mod pool;
pub mod ports;
pub mod publisher;
pub mod supervisor;
