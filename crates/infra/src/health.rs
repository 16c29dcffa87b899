//! Broker liveness probe

use std::time::Duration;

use channelog_core::{check_health, BrokerResult};
use channelog_domain::constants::{HEALTH_CHECK_HEARTBEAT_SECS, HEALTH_CHECK_TIMEOUT_MS};

use crate::amqp::LapinConnector;

/// Dial `url` on a short-lived connection and close it again.
///
/// Uses its own connection; a running supervisor is never touched.
///
/// # Errors
/// Returns `Config` for an invalid URL, `Dial` if the broker refuses the
/// connection and `Timeout` if it does not answer in time.
pub async fn check_broker(url: &str) -> BrokerResult<()> {
    let timeout = Duration::from_millis(HEALTH_CHECK_TIMEOUT_MS);
    let connector =
        LapinConnector::new(url, Duration::from_secs(u64::from(HEALTH_CHECK_HEARTBEAT_SECS)), timeout)?;
    check_health(&connector, timeout).await
}
