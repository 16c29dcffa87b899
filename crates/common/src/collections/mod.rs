//! Specialized data structures
//!
//! - **[`bounded_queue`]**: Bounded, closable FIFO queue with non-blocking
//!   push and pop
//!
//! ## Usage
//!
//! ```rust
//! use channelog_common::collections::{BoundedQueue, TryPushError};
//!
//! let queue = BoundedQueue::new(1);
//! queue.try_push(1).unwrap();
//! assert_eq!(queue.try_push(2), Err(TryPushError::Full(2)));
//! assert_eq!(queue.try_pop(), Some(1));
//! ```

pub mod bounded_queue;

// Re-export commonly used types
pub use bounded_queue::{BoundedQueue, TryPushError};
