//! Resilience patterns for riding out broker outages
//!
//! - **Reconnect backoff**: jittered exponential delays between dial attempts,
//!   reset on the first success
//!
//! The schedule is pure computation; the caller owns the sleeping, so the
//! same type works under a real clock and under tokio's paused test clock.

pub mod backoff;

pub use backoff::{Jitter, ReconnectBackoff, ReconnectBackoffConfig};
