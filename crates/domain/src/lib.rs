//! # Channelog Domain
//!
//! Domain types and models for Channelog.
//!
//! This crate contains:
//! - Configuration structures for the broker pool and the service
//! - Domain error types and Result definitions
//! - Publish requests and the task envelope handed to workers
//! - Domain constants
//!
//! ## Architecture
//! - No dependencies on other Channelog crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
