//! `BrokerChannel` over a `lapin::Channel`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use channelog_core::{BrokerChannel, BrokerError, BrokerResult, CloseNotification};
use channelog_domain::PublishRequest;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use super::errors::{classify, is_already_closed, Operation};

type Notifiers = Arc<Mutex<Vec<oneshot::Sender<BrokerError>>>>;

/// An AMQP channel
pub struct LapinChannel {
    inner: Channel,
    notifiers: Notifiers,
    closing: AtomicBool,
}

impl LapinChannel {
    pub(crate) fn new(inner: Channel) -> Self {
        let notifiers: Notifiers = Arc::new(Mutex::new(Vec::new()));
        let on_error = Arc::clone(&notifiers);
        let id = inner.id();
        inner.on_error(move |err| {
            let reason = classify(&err, Operation::Publish);
            let reason = match reason {
                BrokerError::Publish(message) => BrokerError::ChannelClosed(message),
                other => other,
            };
            debug!(channel = id, error = %reason, "AMQP channel error");
            for notifier in on_error.lock().drain(..) {
                let _ = notifier.send(reason.clone());
            }
        });
        Self { inner, notifiers, closing: AtomicBool::new(false) }
    }
}

fn properties(request: &PublishRequest) -> BasicProperties {
    let mut properties = BasicProperties::default()
        .with_delivery_mode(request.delivery_mode().as_amqp())
        .with_priority(request.priority());
    if let Some(content_type) = request.content_type() {
        properties = properties.with_content_type(content_type.to_owned().into());
    }
    if let Some(encoding) = request.content_encoding() {
        properties = properties.with_content_encoding(encoding.to_owned().into());
    }
    if let Some(id) = request.message_id() {
        properties = properties.with_message_id(id.to_owned().into());
    }
    properties
}

#[async_trait]
impl BrokerChannel for LapinChannel {
    async fn declare_queue(&self, queue: &str) -> BrokerResult<()> {
        let options = QueueDeclareOptions {
            durable: true,
            exclusive: false,
            auto_delete: false,
            ..QueueDeclareOptions::default()
        };
        self.inner
            .queue_declare(queue, options, FieldTable::default())
            .await
            .map(|_| ())
            .map_err(|err| classify(&err, Operation::DeclareQueue(queue)))
    }

    async fn publish(&self, request: &PublishRequest) -> BrokerResult<()> {
        let confirm = self
            .inner
            .basic_publish(
                request.exchange(),
                request.routing_key(),
                BasicPublishOptions::default(),
                request.body(),
                properties(request),
            )
            .await
            .map_err(|err| classify(&err, Operation::Publish))?;
        // Channels are opened in confirm mode; a nack means the broker dropped it.
        let confirmation = confirm.await.map_err(|err| classify(&err, Operation::Publish))?;
        if confirmation.is_nack() {
            return Err(BrokerError::Publish("broker nacked publish".into()));
        }
        Ok(())
    }

    async fn close(&self) -> BrokerResult<()> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.notifiers.lock().clear();
        if !self.inner.status().connected() {
            return Ok(());
        }
        match self.inner.close(200, "OK").await {
            Ok(()) => Ok(()),
            Err(err) if is_already_closed(&err) => Ok(()),
            Err(err) => Err(classify(&err, Operation::Close)),
        }
    }

    fn is_open(&self) -> bool {
        !self.closing.load(Ordering::Acquire) && self.inner.status().connected()
    }

    fn notify_close(&self) -> CloseNotification {
        let (tx, rx) = oneshot::channel();
        let mut notifiers = self.notifiers.lock();
        if self.is_open() {
            notifiers.push(tx);
        }
        rx
    }

    fn number(&self) -> u16 {
        self.inner.id()
    }
}
