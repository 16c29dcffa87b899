//! `BrokerConnector` dialing RabbitMQ with `lapin`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use channelog_core::{BrokerConnection, BrokerConnector, BrokerError, BrokerResult};
use channelog_domain::{redact_url, BrokerConfig};
use lapin::uri::AMQPUri;
use lapin::{Connection, ConnectionProperties};
use tracing::{debug, instrument};

use super::connection::LapinConnection;
use super::errors::{classify, Operation};

/// Dials one AMQP endpoint with fixed heartbeat and connect timeout
#[derive(Clone)]
pub struct LapinConnector {
    uri: AMQPUri,
    endpoint: String,
    connect_timeout: Duration,
}

impl LapinConnector {
    /// # Errors
    /// Returns `BrokerError::Config` if `url` is not a valid AMQP URI.
    pub fn new(url: &str, heartbeat: Duration, connect_timeout: Duration) -> BrokerResult<Self> {
        let mut uri: AMQPUri = url
            .parse()
            .map_err(|e: String| BrokerError::Config(format!("invalid AMQP URL: {e}")))?;
        uri.query.heartbeat = Some(u16::try_from(heartbeat.as_secs()).unwrap_or(u16::MAX));
        uri.query.connection_timeout =
            Some(u64::try_from(connect_timeout.as_millis()).unwrap_or(u64::MAX));

        Ok(Self { uri, endpoint: redact_url(url), connect_timeout })
    }

    /// # Errors
    /// Returns `BrokerError::Config` if the configured URL is invalid.
    pub fn from_config(config: &BrokerConfig) -> BrokerResult<Self> {
        Self::new(&config.amqp_url, config.heartbeat(), config.connect_timeout())
    }

    pub fn heartbeat_secs(&self) -> Option<u16> {
        self.uri.query.heartbeat
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl std::fmt::Debug for LapinConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LapinConnector")
            .field("endpoint", &self.endpoint)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BrokerConnector for LapinConnector {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn connect(&self) -> BrokerResult<Arc<dyn BrokerConnection>> {
        let connection = Connection::connect_uri(self.uri.clone(), ConnectionProperties::default())
            .await
            .map_err(|err| classify(&err, Operation::Dial))?;
        debug!("AMQP connection established");
        Ok(Arc::new(LapinConnection::new(connection)))
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}
