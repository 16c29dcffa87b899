//! `BrokerConnection` over a `lapin::Connection`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use channelog_core::{BrokerChannel, BrokerConnection, BrokerError, BrokerResult, CloseNotification};
use lapin::options::ConfirmSelectOptions;
use lapin::Connection;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::channel::LapinChannel;
use super::errors::{classify, is_already_closed, Operation};

type Notifiers = Arc<Mutex<Vec<oneshot::Sender<BrokerError>>>>;

/// An AMQP connection
pub struct LapinConnection {
    inner: Connection,
    notifiers: Notifiers,
    closing: AtomicBool,
}

impl LapinConnection {
    pub(crate) fn new(inner: Connection) -> Self {
        let notifiers: Notifiers = Arc::new(Mutex::new(Vec::new()));
        let on_error = Arc::clone(&notifiers);
        inner.on_error(move |err| {
            let reason = match classify(&err, Operation::Close) {
                BrokerError::ConnectionClosed(message) | BrokerError::ChannelClosed(message) => {
                    BrokerError::ConnectionClosed(message)
                }
                other => other,
            };
            warn!(error = %reason, "AMQP connection error");
            for notifier in on_error.lock().drain(..) {
                let _ = notifier.send(reason.clone());
            }
        });
        Self { inner, notifiers, closing: AtomicBool::new(false) }
    }
}

#[async_trait]
impl BrokerConnection for LapinConnection {
    async fn open_channel(&self) -> BrokerResult<Box<dyn BrokerChannel>> {
        let channel = self
            .inner
            .create_channel()
            .await
            .map_err(|err| classify(&err, Operation::OpenChannel))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|err| classify(&err, Operation::OpenChannel))?;
        Ok(Box::new(LapinChannel::new(channel)))
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
            Err(err) => {
                debug!(error = %err, "AMQP connection close failed");
                Err(classify(&err, Operation::Close))
            }
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
}
