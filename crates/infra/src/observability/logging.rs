//! Tracing subscriber initialisation
//!
//! Filtering follows `RUST_LOG` (default `info`). Output is human-readable
//! unless `CHANNELOG_LOG_FORMAT=json`.

use std::str::FromStr;

use channelog_domain::constants::ENV_LOG_FORMAT;
use channelog_domain::{ChannelogError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format of the `fmt` layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Read the format from `CHANNELOG_LOG_FORMAT`; unset or unknown means pretty
    pub fn from_env() -> Self {
        std::env::var(ENV_LOG_FORMAT)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for LogFormat {
    type Err = ChannelogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" | "plain" => Ok(Self::Pretty),
            other => Err(ChannelogError::Config(format!("Unknown log format: {other}"))),
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
/// Returns `ChannelogError::Internal` if a global subscriber is already set.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_current_span(false)).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
    };
    result.map_err(|e| ChannelogError::Internal(format!("Failed to initialise tracing: {e}")))
}
