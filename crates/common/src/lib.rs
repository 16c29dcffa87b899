//! Modular common utilities shared across Channelog crates.
//!
//! # Safety and Quality
//!
//! This crate enforces strict safety and quality standards to ensure
//! reliability across all Channelog components.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors, collections
//! - `runtime`: async infrastructure (resilience, lifecycle guards)
//! - `observability`: optional tracing (pulled in by `runtime`)
//! - `test-utils`: async test helpers for downstream crates

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod collections;
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod lifecycle;
#[cfg(feature = "runtime")]
pub mod resilience;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use collections::{BoundedQueue, TryPushError};
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use lifecycle::{catch_panic, spawn_guarded, ComponentHealth, HealthReport};
#[cfg(feature = "runtime")]
pub use resilience::{Jitter, ReconnectBackoff, ReconnectBackoffConfig};
