//! Broker-agnostic description of one message to publish

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::{CONTENT_TYPE_JSON, DEFAULT_EXCHANGE, DEFAULT_PRIORITY};

/// Persistence flag carried on every message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Held in memory only; lost if the broker restarts
    Transient,
    /// Written to disk by the broker before being acknowledged
    Persistent,
}

impl DeliveryMode {
    /// AMQP 0-9-1 wire value (`1` transient, `2` persistent)
    pub fn as_amqp(self) -> u8 {
        match self {
            Self::Transient => 1,
            Self::Persistent => 2,
        }
    }
}

/// A message ready to hand to a broker channel
///
/// Immutable once built. The body is shared, so cloning a request for a
/// retry does not copy the payload.
#[derive(Clone, PartialEq, Eq)]
pub struct PublishRequest {
    exchange: String,
    routing_key: String,
    body: Arc<[u8]>,
    content_type: Option<String>,
    content_encoding: Option<String>,
    delivery_mode: DeliveryMode,
    priority: u8,
    message_id: Option<String>,
}

impl PublishRequest {
    /// A persistent JSON message for `routing_key` on the default exchange
    pub fn new(routing_key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            exchange: DEFAULT_EXCHANGE.to_string(),
            routing_key: routing_key.into(),
            body: Arc::from(body.into()),
            content_type: Some(CONTENT_TYPE_JSON.to_string()),
            content_encoding: None,
            delivery_mode: DeliveryMode::Persistent,
            priority: DEFAULT_PRIORITY,
            message_id: None,
        }
    }

    #[must_use]
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn with_content_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }

    #[must_use]
    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Destination queue name
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery_mode
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }
}

// Bodies can be large and may carry object payloads; log the size only.
impl fmt::Debug for PublishRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishRequest")
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("body_len", &self.body.len())
            .field("content_type", &self.content_type)
            .field("delivery_mode", &self.delivery_mode)
            .field("priority", &self.priority)
            .field("message_id", &self.message_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_to_persistent_json_on_default_exchange() {
        let request = PublishRequest::new("tasks", b"{}".to_vec());
        assert_eq!(request.exchange(), "");
        assert_eq!(request.routing_key(), "tasks");
        assert_eq!(request.content_type(), Some("application/json"));
        assert_eq!(request.delivery_mode(), DeliveryMode::Persistent);
        assert_eq!(request.delivery_mode().as_amqp(), 2);
        assert_eq!(request.priority(), 0);
    }

    #[test]
    fn clones_share_the_body() {
        let request = PublishRequest::new("tasks", vec![1, 2, 3]).with_priority(5);
        let retry = request.clone();
        assert_eq!(retry, request);
        assert!(std::ptr::eq(retry.body().as_ptr(), request.body().as_ptr()));
    }

    #[test]
    fn debug_omits_body_bytes() {
        let request = PublishRequest::new("tasks", "secret-payload");
        let rendered = format!("{request:?}");
        assert!(rendered.contains("body_len: 14"));
        assert!(!rendered.contains("secret-payload"));
    }
}
