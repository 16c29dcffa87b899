//! # Channelog
//!
//! Process wiring for the task publisher: builds the broker adapter, the
//! connection supervisor and the publishing services from a loaded
//! [`Config`](channelog_domain::Config).

pub mod context;

pub use context::AppContext;
