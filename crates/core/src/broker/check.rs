//! Liveness dial
//!
//! A short-lived, independent connection used to answer health probes. It
//! never touches a supervisor's connection or pool.

use std::time::Duration;

use tracing::{debug, instrument};

use super::error::{BrokerError, BrokerResult};
use super::ports::BrokerConnector;

/// Dial the broker once and close the connection again.
///
/// # Errors
/// Returns the dial error, or `Timeout` if the dial does not finish within
/// `timeout`. Errors while closing are logged and ignored.
#[instrument(skip(connector), fields(endpoint = %connector.endpoint()))]
pub async fn check_health(connector: &dyn BrokerConnector, timeout: Duration) -> BrokerResult<()> {
    let connection = tokio::time::timeout(timeout, connector.connect())
        .await
        .map_err(|_| BrokerError::Timeout { operation: "health check dial", after: timeout })??;

    if let Err(err) = connection.close().await {
        debug!(error = %err, "Health check connection close reported an error");
    }
    debug!("Broker health check passed");
    Ok(())
}
