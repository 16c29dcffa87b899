//! Task publishing service

pub mod service;

pub use service::TaskPublisher;
