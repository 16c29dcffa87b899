//! Application context - dependency injection container

use std::sync::Arc;

use channelog_common::lifecycle::HealthReport;
use channelog_core::{
    BrokerConnector, BrokerMetrics, ConnectionSupervisor, PublishCoordinator, SupervisorConfig,
    TaskPublisher,
};
use channelog_domain::{Config, Result};
use channelog_infra::LapinConnector;
use tracing::{info, instrument};

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub supervisor: ConnectionSupervisor,
    pub coordinator: Arc<PublishCoordinator>,
    pub tasks: TaskPublisher,
    pub metrics: Arc<BrokerMetrics>,
}

impl AppContext {
    /// Build the context against the AMQP broker named in `config`.
    ///
    /// Nothing is dialed until [`start`](Self::start).
    ///
    /// # Errors
    /// Returns `ChannelogError::Config` for an invalid configuration or an
    /// unparseable broker URL.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let connector = Arc::new(LapinConnector::from_config(&config.broker)?);
        Self::with_connector(config, connector)
    }

    /// Build the context on an arbitrary connector
    ///
    /// # Errors
    /// Returns `ChannelogError::Config` when the supervisor rejects the
    /// broker settings.
    pub fn with_connector(config: Config, connector: Arc<dyn BrokerConnector>) -> Result<Self> {
        let metrics = Arc::new(BrokerMetrics::new());
        let supervisor = ConnectionSupervisor::new(
            connector,
            SupervisorConfig::from(&config.broker),
            Arc::clone(&metrics),
        )?;
        let coordinator =
            Arc::new(PublishCoordinator::from_config(supervisor.clone(), &config.broker));
        let tasks = TaskPublisher::new(
            Arc::clone(&coordinator),
            config.broker.queue_name.clone(),
            config.service.location.clone(),
        );

        Ok(Self { config, supervisor, coordinator, tasks, metrics })
    }

    /// Spawn the connection supervisor
    ///
    /// # Errors
    /// Fails only if the context was already shut down.
    #[instrument(skip(self), fields(queue = %self.config.broker.queue_name))]
    pub fn start(&self) -> Result<()> {
        self.supervisor.start()?;
        info!(
            endpoint = %self.config.broker.redacted_url(),
            location = %self.config.service.location,
            "Channelog started"
        );
        Ok(())
    }

    pub fn health_check(&self) -> HealthReport {
        self.supervisor.health()
    }

    /// Stop the supervisor, closing every pooled channel and the connection.
    ///
    /// # Errors
    /// Propagates a failure to close the broker connection.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down");
        self.supervisor.stop().await?;
        let snapshot = self.metrics.snapshot();
        info!(
            publish_attempts = snapshot.publish_attempts,
            publish_failures = snapshot.publish_failures,
            reconnects = snapshot.reconnects,
            "Channelog stopped"
        );
        Ok(())
    }
}
