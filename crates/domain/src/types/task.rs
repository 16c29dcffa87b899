//! Task envelope consumed by the worker fleet.
//!
//! Workers run Celery with the `json` serializer, so the envelope mirrors the
//! shape Celery expects: `id`, `task`, positional `args` (always empty),
//! keyword `kwargs` carrying the event metadata, `retries` and `eta`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::constants::CONTENT_ENCODING_UTF8;
use crate::errors::{ChannelogError, Result};
use crate::types::publish::{DeliveryMode, PublishRequest};

/// Identity of the cluster object an event is about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub uid: String,
    pub namespace: String,
    pub name: String,
    pub resource: String,
}

/// A Celery-compatible task message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub id: String,
    pub task: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub retries: u32,
    pub eta: Option<String>,
}

impl TaskMessage {
    /// Start building a message for the named worker task
    pub fn builder(task: impl Into<String>) -> TaskMessageBuilder {
        TaskMessageBuilder {
            task: task.into(),
            kwargs: Map::new(),
            location: None,
            timestamp: None,
        }
    }

    /// Serialize to the JSON body workers consume
    ///
    /// # Errors
    /// Returns `ChannelogError::Serialization` if a kwarg cannot be encoded.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Wrap the message for publishing to `queue` on the default exchange
    ///
    /// # Errors
    /// Returns `ChannelogError::Serialization` if the body cannot be encoded.
    pub fn into_publish_request(self, queue: &str) -> Result<PublishRequest> {
        let body = self.to_json()?;
        Ok(PublishRequest::new(queue, body)
            .with_content_encoding(CONTENT_ENCODING_UTF8)
            .with_delivery_mode(DeliveryMode::Persistent)
            .with_message_id(self.id))
    }
}

/// Builder for [`TaskMessage`]
#[derive(Debug, Clone)]
pub struct TaskMessageBuilder {
    task: String,
    kwargs: Map<String, Value>,
    location: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl TaskMessageBuilder {
    /// Add an arbitrary keyword argument
    #[must_use]
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Deployment location of this service instance (required)
    #[must_use]
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Add `uid`, `namespace`, `name` and `resource` for the object
    #[must_use]
    pub fn resource(self, resource: &ResourceRef) -> Self {
        self.kwarg("uid", resource.uid.clone())
            .kwarg("namespace", resource.namespace.clone())
            .kwarg("name", resource.name.clone())
            .kwarg("resource", resource.resource.clone())
    }

    /// Embed the full object the event is about
    #[must_use]
    pub fn raw_object(self, object: Value) -> Self {
        self.kwarg("raw_object", object)
    }

    /// Node events carry the node name instead of the raw object
    #[must_use]
    pub fn node_name(self, node: impl Into<String>) -> Self {
        self.kwarg("node_name", node.into())
    }

    /// Override the event timestamp (defaults to now)
    #[must_use]
    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    /// # Errors
    /// Returns `ChannelogError::InvalidInput` if the task name or location is
    /// missing.
    pub fn build(self) -> Result<TaskMessage> {
        if self.task.trim().is_empty() {
            return Err(ChannelogError::InvalidInput("task name must not be empty".to_string()));
        }
        let location = self
            .location
            .filter(|loc| !loc.trim().is_empty())
            .ok_or_else(|| ChannelogError::InvalidInput("task location is required".to_string()))?;
        let timestamp = self
            .timestamp
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Nanos, true);

        let mut kwargs = self.kwargs;
        kwargs.insert("taskName".to_string(), Value::String(self.task.clone()));
        kwargs.insert("location".to_string(), Value::String(location));
        kwargs.insert("timestamp".to_string(), Value::String(timestamp));

        Ok(TaskMessage {
            id: Uuid::new_v4().to_string(),
            task: self.task,
            args: Vec::new(),
            kwargs,
            retries: 0,
            eta: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn build_requires_location() {
        let err = TaskMessage::builder("pod_changed").build().unwrap_err();
        assert!(matches!(err, ChannelogError::InvalidInput(_)));
    }

    #[test]
    fn build_rejects_blank_task() {
        assert!(TaskMessage::builder(" ").location("eu").build().is_err());
    }

    #[test]
    fn standard_kwargs_are_always_present() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let message =
            TaskMessage::builder("pod_changed").location("eu-west-1").timestamp(at).build().unwrap();

        assert_eq!(message.kwargs["taskName"], "pod_changed");
        assert_eq!(message.kwargs["location"], "eu-west-1");
        assert_eq!(message.kwargs["timestamp"], "2024-05-01T12:00:00.000000000Z");
        assert!(message.args.is_empty());
        assert_eq!(message.retries, 0);
        assert!(message.eta.is_none());
        assert!(Uuid::parse_str(&message.id).is_ok());
    }

    #[test]
    fn builder_cannot_override_task_name_kwarg() {
        let message = TaskMessage::builder("real")
            .kwarg("taskName", "spoofed")
            .location("eu")
            .build()
            .unwrap();
        assert_eq!(message.kwargs["taskName"], "real");
    }

    #[test]
    fn json_shape_matches_worker_expectations() {
        let message = TaskMessage::builder("node_changed")
            .location("us")
            .node_name("worker-1")
            .build()
            .unwrap();
        let value: Value = serde_json::from_slice(&message.to_json().unwrap()).unwrap();

        assert_eq!(value["args"], Value::Array(Vec::new()));
        assert_eq!(value["eta"], Value::Null);
        assert_eq!(value["retries"], 0);
        assert_eq!(value["kwargs"]["node_name"], "worker-1");
    }
}
