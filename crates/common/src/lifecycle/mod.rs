//! Lifecycle utilities for long-running async components
//!
//! - **[`guard`]**: per-task failure isolation, so a panic in one background
//!   task is logged instead of tearing down the process
//! - **[`health`]**: component health reports for liveness endpoints

pub mod guard;
pub mod health;

pub use guard::{catch_panic, panic_message, spawn_guarded};
pub use health::{ComponentHealth, HealthReport};
