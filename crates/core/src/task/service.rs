//! Task publishing service - wraps events into task envelopes and enqueues
//! them on the configured queue

use std::sync::Arc;

use channelog_domain::{ChannelogError, Result, TaskMessage, TaskMessageBuilder};
use tracing::{error, info};

use crate::broker::publisher::PublishCoordinator;

/// Enqueues worker tasks through a shared [`PublishCoordinator`]
#[derive(Debug, Clone)]
pub struct TaskPublisher {
    coordinator: Arc<PublishCoordinator>,
    queue: String,
    location: String,
}

impl TaskPublisher {
    pub fn new(
        coordinator: Arc<PublishCoordinator>,
        queue: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self { coordinator, queue: queue.into(), location: location.into() }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Start a message for `task`, stamped with this service's location
    pub fn new_task(&self, task: impl Into<String>) -> TaskMessageBuilder {
        TaskMessage::builder(task).location(self.location.clone())
    }

    /// Publish `message` and return its task id.
    ///
    /// Failures are logged here; callers are expected to drop the task.
    pub async fn push_task(&self, message: TaskMessage) -> Result<String> {
        let task_id = message.id.clone();
        let task = message.task.clone();
        let request = message.into_publish_request(&self.queue)?;

        match self.coordinator.publish_with_retry(&request).await {
            Ok(()) => {
                info!(task_id = %task_id, task = %task, queue = %self.queue, "Enqueued task");
                Ok(task_id)
            }
            Err(err) => {
                error!(task_id = %task_id, task = %task, queue = %self.queue, error = %err, "Failed to enqueue task");
                Err(ChannelogError::from(err))
            }
        }
    }
}
