//! Channel health tracking.
//!
//! The broker can close a channel at any moment (a failed publish, a
//! precondition error, an administrator action). Those closures arrive
//! asynchronously; the tracker records them so the pool never hands such a
//! channel out again. Close watchers are the only writers. Acquire, release
//! and the close path consume entries, removing each one the moment it is read.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use channelog_common::lifecycle::spawn_guarded;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::pool::ChannelKey;
use super::ports::CloseNotification;

/// Set of channels the broker has closed
#[derive(Debug, Default)]
pub struct ChannelHealthTracker {
    bad: Mutex<HashSet<ChannelKey>>,
}

impl ChannelHealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` as closed by the broker. Returns `true` if newly added.
    pub fn mark_bad(&self, key: ChannelKey) -> bool {
        self.bad.lock().insert(key)
    }

    /// Record `key` unless `already_closed` reports a local close.
    ///
    /// The check runs under the set's lock so it cannot interleave with
    /// [`take`](Self::take) on the close path.
    pub fn mark_bad_unless(&self, key: ChannelKey, already_closed: &AtomicBool) -> bool {
        let mut bad = self.bad.lock();
        if already_closed.load(Ordering::Acquire) {
            return false;
        }
        bad.insert(key)
    }

    /// Remove `key`, returning whether it was marked bad
    pub fn take(&self, key: ChannelKey) -> bool {
        self.bad.lock().remove(&key)
    }

    pub fn is_bad(&self, key: ChannelKey) -> bool {
        self.bad.lock().contains(&key)
    }

    /// Number of channels currently marked bad
    pub fn len(&self) -> usize {
        self.bad.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn a watcher that marks `key` bad when `notification` fires.
    ///
    /// The watcher exits without marking when `stop` is cancelled, when the
    /// notifier is dropped (local close), or when `lease_closed` is already
    /// set by the time the notification arrives.
    pub fn watch(
        self: &Arc<Self>,
        key: ChannelKey,
        notification: CloseNotification,
        lease_closed: Arc<AtomicBool>,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        spawn_guarded("channel_close_watcher", async move {
            tokio::select! {
                () = stop.cancelled() => {}
                outcome = notification => match outcome {
                    Ok(reason) => {
                        if tracker.mark_bad_unless(key, &lease_closed) {
                            warn!(channel = %key, error = %reason, "Channel closed by broker; marked bad");
                        }
                    }
                    Err(_) => debug!(channel = %key, "Channel close notifier dropped"),
                }
            }
        })
    }
}
