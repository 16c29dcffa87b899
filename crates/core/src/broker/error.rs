//! Broker error taxonomy
//!
//! Adapters classify client failures once, into a [`BrokerErrorKind`]. Retry
//! and reconnect decisions compare kinds; they never look at message text.

use std::time::Duration;

use channelog_common::error::{ErrorClassification, ErrorSeverity};
use channelog_domain::ChannelogError;
use thiserror::Error;

/// Result alias for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Classification of a [`BrokerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerErrorKind {
    /// The broker could not be reached
    Dial,
    /// The connection is (or turned out to be) not open
    ConnectionClosed,
    /// The connection is alive but refused a new channel
    ChannelOpen,
    /// The channel was closed, usually by the broker
    ChannelClosed,
    QueueDeclare,
    Publish,
    /// No connection appeared before the acquire deadline
    NoConnection,
    Timeout,
    /// Every publish attempt failed
    Exhausted,
    ShuttingDown,
    /// The caller cancelled the operation
    Cancelled,
    Panicked,
    Config,
}

/// Errors raised by broker adapters and the pooling core
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("failed to dial broker: {0}")]
    Dial(String),

    #[error("connection is not open: {0}")]
    ConnectionClosed(String),

    #[error("failed to open channel: {0}")]
    ChannelOpen(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error("failed to declare queue '{queue}': {message}")]
    QueueDeclare { queue: String, message: String },

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("no broker connection after waiting {waited:?}")]
    NoConnection { waited: Duration },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: &'static str, after: Duration },

    #[error("no channel available: {source}")]
    NoChannel { source: Box<BrokerError> },

    #[error("no channel available on retry: {source}")]
    NoChannelOnRetry { source: Box<BrokerError> },

    #[error("failed to publish after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: Box<BrokerError> },

    #[error("broker supervisor is shutting down")]
    ShuttingDown,

    #[error("operation cancelled")]
    Cancelled,

    #[error("panic contained at task boundary: {0}")]
    Panicked(String),

    #[error("invalid broker configuration: {0}")]
    Config(String),
}

impl BrokerError {
    /// Kind of this error; acquire wrappers report the kind of their cause
    pub fn kind(&self) -> BrokerErrorKind {
        match self {
            Self::Dial(_) => BrokerErrorKind::Dial,
            Self::ConnectionClosed(_) => BrokerErrorKind::ConnectionClosed,
            Self::ChannelOpen(_) => BrokerErrorKind::ChannelOpen,
            Self::ChannelClosed(_) => BrokerErrorKind::ChannelClosed,
            Self::QueueDeclare { .. } => BrokerErrorKind::QueueDeclare,
            Self::Publish(_) => BrokerErrorKind::Publish,
            Self::NoConnection { .. } => BrokerErrorKind::NoConnection,
            Self::Timeout { .. } => BrokerErrorKind::Timeout,
            Self::NoChannel { source } | Self::NoChannelOnRetry { source } => source.kind(),
            Self::Exhausted { .. } => BrokerErrorKind::Exhausted,
            Self::ShuttingDown => BrokerErrorKind::ShuttingDown,
            Self::Cancelled => BrokerErrorKind::Cancelled,
            Self::Panicked(_) => BrokerErrorKind::Panicked,
            Self::Config(_) => BrokerErrorKind::Config,
        }
    }

    /// Kind of the innermost cause
    pub fn root_kind(&self) -> BrokerErrorKind {
        match self {
            Self::NoChannel { source }
            | Self::NoChannelOnRetry { source }
            | Self::Exhausted { source, .. } => source.root_kind(),
            other => other.kind(),
        }
    }

    /// True when the underlying connection is dead and should be recycled
    /// instead of waiting for the broker's close notification
    pub fn indicates_dead_connection(&self) -> bool {
        self.root_kind() == BrokerErrorKind::ConnectionClosed
    }

    pub fn queue_declare(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueueDeclare { queue: queue.into(), message: message.into() }
    }
}

impl ErrorClassification for BrokerError {
    fn is_retryable(&self) -> bool {
        match self.kind() {
            BrokerErrorKind::Dial
            | BrokerErrorKind::ConnectionClosed
            | BrokerErrorKind::ChannelOpen
            | BrokerErrorKind::ChannelClosed
            | BrokerErrorKind::Publish
            | BrokerErrorKind::NoConnection
            | BrokerErrorKind::Timeout => true,
            BrokerErrorKind::QueueDeclare
            | BrokerErrorKind::Exhausted
            | BrokerErrorKind::ShuttingDown
            | BrokerErrorKind::Cancelled
            | BrokerErrorKind::Panicked
            | BrokerErrorKind::Config => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self.kind() {
            BrokerErrorKind::ChannelClosed | BrokerErrorKind::Timeout => ErrorSeverity::Warning,
            BrokerErrorKind::ShuttingDown | BrokerErrorKind::Cancelled => ErrorSeverity::Info,
            BrokerErrorKind::Panicked | BrokerErrorKind::Config => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self.kind(), BrokerErrorKind::Panicked | BrokerErrorKind::Config)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self.kind() {
            BrokerErrorKind::NoConnection | BrokerErrorKind::Dial => Some(Duration::from_secs(1)),
            _ => None,
        }
    }
}

impl From<BrokerError> for ChannelogError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Config(message) => Self::Config(message),
            BrokerError::Panicked(message) => Self::Internal(message),
            other => Self::Broker(other.to_string()),
        }
    }
}
