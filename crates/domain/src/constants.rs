//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! service.

// Broker pool defaults
pub const DEFAULT_MAX_CHANNEL_POOL: usize = 50;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_HEARTBEAT_SECS: u16 = 30;
pub const DEFAULT_ACQUIRE_RETRY_DELAY_MS: u64 = 150;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_PUBLISH_ATTEMPTS: u32 = 2;

// Reconnect backoff
pub const DEFAULT_BACKOFF_FLOOR_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_JITTER_MS: u64 = 500;

// Liveness probe dial
pub const HEALTH_CHECK_HEARTBEAT_SECS: u16 = 5;
pub const HEALTH_CHECK_TIMEOUT_MS: u64 = 5_000;

// Message properties
pub const DEFAULT_EXCHANGE: &str = "";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_ENCODING_UTF8: &str = "utf-8";
pub const DEFAULT_PRIORITY: u8 = 0;

// Environment variables
pub const ENV_RABBITMQ_URL: &str = "RABBITMQ_URL";
pub const ENV_QUEUE_NAME: &str = "DEFAULT_RABBITMQ_QUEUE";
pub const ENV_MAX_CHANNEL_POOL: &str = "MAX_CHANNEL_POOL_SIZE";
pub const ENV_LOCATION: &str = "LOCATION";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "CHANNELOG_CONNECT_TIMEOUT_MS";
pub const ENV_HEARTBEAT_SECS: &str = "CHANNELOG_HEARTBEAT_SECS";
pub const ENV_BACKOFF_FLOOR_MS: &str = "CHANNELOG_BACKOFF_FLOOR_MS";
pub const ENV_BACKOFF_MAX_MS: &str = "CHANNELOG_BACKOFF_MAX_MS";
pub const ENV_BACKOFF_JITTER_MS: &str = "CHANNELOG_BACKOFF_JITTER_MS";
pub const ENV_ACQUIRE_RETRY_DELAY_MS: &str = "CHANNELOG_ACQUIRE_RETRY_DELAY_MS";
pub const ENV_ACQUIRE_TIMEOUT_MS: &str = "CHANNELOG_ACQUIRE_TIMEOUT_MS";
pub const ENV_PUBLISH_TIMEOUT_MS: &str = "CHANNELOG_PUBLISH_TIMEOUT_MS";
pub const ENV_MAX_PUBLISH_ATTEMPTS: &str = "CHANNELOG_MAX_PUBLISH_ATTEMPTS";
pub const ENV_WARM_UP: &str = "CHANNELOG_WARM_UP";
pub const ENV_LOG_FORMAT: &str = "CHANNELOG_LOG_FORMAT";
