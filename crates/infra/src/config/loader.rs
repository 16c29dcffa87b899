//! Configuration loader
//!
//! Loads service configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. `.env` is loaded into the environment if present (see [`load`])
//! 2. Attempts to load from environment variables
//! 3. If a required variable is missing, falls back to loading from file
//! 4. Probes multiple paths for config files
//! 5. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! Required:
//! - `RABBITMQ_URL`: AMQP connection string
//! - `DEFAULT_RABBITMQ_QUEUE`: Destination queue
//! - `LOCATION`: Region stamped into every task envelope
//!
//! Optional (defaults in `channelog_domain::constants`):
//! - `MAX_CHANNEL_POOL_SIZE`
//! - `CHANNELOG_CONNECT_TIMEOUT_MS`, `CHANNELOG_HEARTBEAT_SECS`
//! - `CHANNELOG_BACKOFF_FLOOR_MS`, `CHANNELOG_BACKOFF_MAX_MS`,
//!   `CHANNELOG_BACKOFF_JITTER_MS`
//! - `CHANNELOG_ACQUIRE_RETRY_DELAY_MS`, `CHANNELOG_ACQUIRE_TIMEOUT_MS`
//! - `CHANNELOG_PUBLISH_TIMEOUT_MS`, `CHANNELOG_MAX_PUBLISH_ATTEMPTS`
//! - `CHANNELOG_WARM_UP` (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./channelog.json` or `./channelog.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)
//! 5. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use channelog_domain::constants::{
    DEFAULT_ACQUIRE_RETRY_DELAY_MS, DEFAULT_ACQUIRE_TIMEOUT_MS, DEFAULT_BACKOFF_FLOOR_MS,
    DEFAULT_BACKOFF_JITTER_MS, DEFAULT_BACKOFF_MAX_MS, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_HEARTBEAT_SECS, DEFAULT_MAX_CHANNEL_POOL, DEFAULT_MAX_PUBLISH_ATTEMPTS,
    DEFAULT_PUBLISH_TIMEOUT_MS, ENV_ACQUIRE_RETRY_DELAY_MS, ENV_ACQUIRE_TIMEOUT_MS,
    ENV_BACKOFF_FLOOR_MS, ENV_BACKOFF_JITTER_MS, ENV_BACKOFF_MAX_MS, ENV_CONNECT_TIMEOUT_MS,
    ENV_HEARTBEAT_SECS, ENV_LOCATION, ENV_MAX_CHANNEL_POOL, ENV_MAX_PUBLISH_ATTEMPTS,
    ENV_PUBLISH_TIMEOUT_MS, ENV_QUEUE_NAME, ENV_RABBITMQ_URL, ENV_WARM_UP,
};
use channelog_domain::{BrokerConfig, ChannelogError, Config, Result, ServiceConfig};

/// Load configuration with automatic fallback strategy
///
/// Loads `.env` if present, then attempts environment variables. If any
/// required variable is missing, falls back to a config file. The result is
/// validated either way.
///
/// # Errors
/// Returns `ChannelogError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - A value fails validation
pub fn load() -> Result<Config> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// The three required variables must be present; every other setting falls
/// back to its default when unset.
///
/// # Errors
/// Returns `ChannelogError::Config` if required variables are missing,
/// a value cannot be parsed, or validation fails.
pub fn load_from_env() -> Result<Config> {
    let broker = BrokerConfig {
        amqp_url: env_var(ENV_RABBITMQ_URL)?,
        queue_name: env_var(ENV_QUEUE_NAME)?,
        max_channel_pool: env_parse(ENV_MAX_CHANNEL_POOL, DEFAULT_MAX_CHANNEL_POOL)?,
        connect_timeout_ms: env_parse(ENV_CONNECT_TIMEOUT_MS, DEFAULT_CONNECT_TIMEOUT_MS)?,
        heartbeat_secs: env_parse(ENV_HEARTBEAT_SECS, DEFAULT_HEARTBEAT_SECS)?,
        backoff_floor_ms: env_parse(ENV_BACKOFF_FLOOR_MS, DEFAULT_BACKOFF_FLOOR_MS)?,
        backoff_max_ms: env_parse(ENV_BACKOFF_MAX_MS, DEFAULT_BACKOFF_MAX_MS)?,
        backoff_jitter_ms: env_parse(ENV_BACKOFF_JITTER_MS, DEFAULT_BACKOFF_JITTER_MS)?,
        acquire_retry_delay_ms: env_parse(
            ENV_ACQUIRE_RETRY_DELAY_MS,
            DEFAULT_ACQUIRE_RETRY_DELAY_MS,
        )?,
        acquire_timeout_ms: env_parse(ENV_ACQUIRE_TIMEOUT_MS, DEFAULT_ACQUIRE_TIMEOUT_MS)?,
        publish_timeout_ms: env_parse(ENV_PUBLISH_TIMEOUT_MS, DEFAULT_PUBLISH_TIMEOUT_MS)?,
        max_publish_attempts: env_parse(ENV_MAX_PUBLISH_ATTEMPTS, DEFAULT_MAX_PUBLISH_ATTEMPTS)?,
        warm_up: env_bool(ENV_WARM_UP, true)?,
    };
    let service = ServiceConfig { location: env_var(ENV_LOCATION)? };

    let config = Config { broker, service };
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `ChannelogError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - Required fields are missing or fail validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ChannelogError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ChannelogError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ChannelogError::Config(format!("Failed to read config file: {}", e)))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ChannelogError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ChannelogError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(ChannelogError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the current working directory (and up to two parents), then the
/// executable's directory (and up to two parents).
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidates_in(&cwd));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidates_in(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn candidates_in(dir: &Path) -> Vec<PathBuf> {
    vec![
        dir.join("config.json"),
        dir.join("config.toml"),
        dir.join("channelog.json"),
        dir.join("channelog.toml"),
        dir.join("../config.json"),
        dir.join("../config.toml"),
        dir.join("../../config.json"),
        dir.join("../../config.toml"),
    ]
}

/// Get required environment variable
///
/// # Errors
/// Returns `ChannelogError::Config` if the variable is not set.
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        ChannelogError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Parse an optional environment variable, using `default` when unset
///
/// # Errors
/// Returns `ChannelogError::Config` if the variable is set but invalid.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ChannelogError::Config(format!("Invalid value for {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
/// Any other value is a config error.
fn env_bool(key: &str, default: bool) -> Result<bool> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ChannelogError::Config(format!("Invalid value for {}: {}", key, raw))),
    }
}
