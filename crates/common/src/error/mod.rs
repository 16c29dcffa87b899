//! Common error types and utilities shared by the Channelog crates
//!
//! This module provides the error variants shared by the foundation
//! utilities and the classification trait every module-specific error
//! implements.
//!
//! # Error Handling Architecture
//!
//! 1. **`CommonError`**: failures raised by shared utilities (invalid
//!    settings, contained task panics)
//!
//! 2. **`ErrorClassification` trait**: a standard interface for classifying
//!    errors by retryability and severity
//!
//! 3. **`ErrorSeverity` enum**: a unified severity level for logging

use std::fmt;
use std::time::Duration;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Error variants raised by the shared utilities
#[derive(Debug, Clone, PartialEq)]
pub enum CommonError {
    /// Configuration-related errors
    Config { message: String, field: Option<String> },

    /// An independently scheduled task panicked and was contained
    TaskPanicked { task: String, message: String },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field } => {
                if let Some(field) = field {
                    write!(f, "Configuration error in field '{}': {}", field, message)
                } else {
                    write!(f, "Configuration error: {}", message)
                }
            }
            Self::TaskPanicked { task, message } => {
                write!(f, "Task '{}' panicked: {}", task, message)
            }
        }
    }
}

impl std::error::Error for CommonError {}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Config { .. } => ErrorSeverity::Error,
            Self::TaskPanicked { .. } => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::TaskPanicked { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl CommonError {
    /// Create a configuration error for a specific field
    pub fn config_field<S: Into<String>, F: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    /// Create a task-panicked error
    pub fn task_panicked<T: Into<String>, M: Into<String>>(task: T, message: M) -> Self {
        Self::TaskPanicked { task: task.into(), message: message.into() }
    }
}

/// Error classification trait for consistent error handling across modules
///
/// Retry loops, log levels and the reconnect decision all read errors through
/// this trait rather than inspecting message text.
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again, such as a dropped channel or a broker that is restarting.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
