//! Testing utilities shared by the workspace test suites
//!
//! - **[`async_utils`]**: async waiting helpers that cooperate with tokio's
//!   paused clock
//!
//! `assert_eventually_async!` is exported at the crate root.

pub mod async_utils;

pub use async_utils::{poll_until, timeout_ok};
