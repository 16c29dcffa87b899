//! # Channelog Infrastructure
//!
//! Infrastructure implementations of core broker ports.
//!
//! This crate contains:
//! - The AMQP 0-9-1 adapter on `lapin`
//! - The broker liveness probe
//! - Configuration loading from environment and files
//! - Tracing subscriber setup
//!
//! ## Architecture
//! - Implements traits defined in `channelog-core`
//! - Contains all "impure" code (network I/O, environment, files)

pub mod amqp;
pub mod config;
pub mod health;
pub mod observability;

// Re-export commonly used items
pub use amqp::{LapinChannel, LapinConnection, LapinConnector};
pub use health::check_broker;
pub use observability::{init_tracing, LogFormat};
