//! Common data types used throughout the service

pub mod publish;
pub mod task;

pub use publish::{DeliveryMode, PublishRequest};
pub use task::{ResourceRef, TaskMessage, TaskMessageBuilder};
