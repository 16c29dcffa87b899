//! Publish coordinator.
//!
//! The only write path to the broker. Each call makes at most
//! `max_attempts` strictly sequential attempts; the channel of a failed
//! attempt is always discarded before the next acquire.

use std::sync::Arc;
use std::time::Duration;

use channelog_common::lifecycle::catch_panic;
use channelog_domain::{constants, BrokerConfig, PublishRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use super::error::{BrokerError, BrokerResult};
use super::metrics::BrokerMetrics;
use super::pool::PooledChannel;
use super::supervisor::ConnectionSupervisor;

/// Publishes messages through a [`ConnectionSupervisor`] with bounded retry
#[derive(Debug, Clone)]
pub struct PublishCoordinator {
    supervisor: ConnectionSupervisor,
    max_attempts: u32,
    publish_timeout: Duration,
    metrics: Arc<BrokerMetrics>,
}

impl PublishCoordinator {
    /// Create a coordinator with the default attempt cap and publish timeout
    pub fn new(supervisor: ConnectionSupervisor) -> Self {
        let metrics = supervisor.metrics();
        Self {
            supervisor,
            max_attempts: constants::DEFAULT_MAX_PUBLISH_ATTEMPTS,
            publish_timeout: Duration::from_millis(constants::DEFAULT_PUBLISH_TIMEOUT_MS),
            metrics,
        }
    }

    pub fn from_config(supervisor: ConnectionSupervisor, config: &BrokerConfig) -> Self {
        Self::new(supervisor)
            .with_max_attempts(config.max_publish_attempts)
            .with_publish_timeout(config.publish_timeout())
    }

    /// Attempt cap; values below one are raised to one
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_publish_timeout(mut self, publish_timeout: Duration) -> Self {
        self.publish_timeout = publish_timeout;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    /// Publish `request`, cancelled only by supervisor shutdown.
    ///
    /// # Errors
    /// - `Exhausted { attempts, .. }` when every attempt failed
    /// - `NoChannel` / `NoChannelOnRetry` when no channel could be leased
    /// - `Panicked` if the publish path panicked
    pub async fn publish_with_retry(&self, request: &PublishRequest) -> BrokerResult<()> {
        let cancel = self.supervisor.cancellation_token();
        self.publish_with_retry_until(request, &cancel).await
    }

    /// Publish `request`, giving up with `Cancelled` once `cancel` fires.
    #[instrument(skip(self, request, cancel), fields(routing_key = %request.routing_key()))]
    pub async fn publish_with_retry_until(
        &self,
        request: &PublishRequest,
        cancel: &CancellationToken,
    ) -> BrokerResult<()> {
        match catch_panic("publish_with_retry", self.run_attempts(request, cancel)).await {
            Ok(result) => result,
            Err(err) => Err(BrokerError::Panicked(err.to_string())),
        }
    }

    async fn run_attempts(&self, request: &PublishRequest, cancel: &CancellationToken) -> BrokerResult<()> {
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            let channel = self.acquire(attempt, cancel).await?;
            let key = channel.key();
            let generation = channel.generation();

            self.metrics.record_publish_attempt();
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                outcome = self.publish_once(&channel, request) => Some(outcome),
            };
            let Some(outcome) = outcome else {
                self.supervisor.discard(channel).await;
                return Err(BrokerError::Cancelled);
            };

            match outcome {
                Ok(()) => {
                    debug!(channel = %key, attempt, "Published message");
                    self.supervisor.release(channel).await;
                    return Ok(());
                }
                Err(err) => {
                    self.metrics.record_publish_failure();
                    error!(
                        channel = %key,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Publish attempt failed"
                    );
                    self.supervisor.discard(channel).await;
                    self.supervisor.report_failure(generation, &err).await;

                    if attempt >= self.max_attempts {
                        self.metrics.record_publish_exhausted();
                        return Err(BrokerError::Exhausted { attempts: attempt, source: Box::new(err) });
                    }
                }
            }
        }
    }

    async fn acquire(&self, attempt: u32, cancel: &CancellationToken) -> BrokerResult<PooledChannel> {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(BrokerError::Cancelled),
            result = self.supervisor.acquire() => result,
        };
        result.map_err(|source| {
            let source = Box::new(source);
            if attempt == 1 {
                BrokerError::NoChannel { source }
            } else {
                BrokerError::NoChannelOnRetry { source }
            }
        })
    }

    async fn publish_once(&self, channel: &PooledChannel, request: &PublishRequest) -> BrokerResult<()> {
        match tokio::time::timeout(self.publish_timeout, channel.publish(request)).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout { operation: "publish", after: self.publish_timeout }),
        }
    }
}
