//! Top-level error type and classification shared by all crates.

use core::fmt;

use crate::{ConfigError, LifecycleError, NumericalError, QueryError};

/// Top-level error type wrapping every estimation sub-error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WholeBodyError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Per-cycle numerical failures
    #[error("Numerical error: {0}")]
    Numerical(#[from] NumericalError),

    /// Estimate query errors
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// State machine misuse
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

impl WholeBodyError {
    /// Get the error category for classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            WholeBodyError::Config(_) => ErrorCategory::Config,
            WholeBodyError::Numerical(_) => ErrorCategory::Numerical,
            WholeBodyError::Query(QueryError::SensorRead { .. }) => ErrorCategory::Sensor,
            WholeBodyError::Query(_) => ErrorCategory::Query,
            WholeBodyError::Lifecycle(_) => ErrorCategory::Lifecycle,
        }
    }

    /// Get the error severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WholeBodyError::Config(_) => ErrorSeverity::Error,
            WholeBodyError::Numerical(e) => e.severity(),
            WholeBodyError::Query(e) => e.severity(),
            WholeBodyError::Lifecycle(e) => e.severity(),
        }
    }

    /// Check if the estimator can keep running after this error.
    pub fn is_recoverable(&self) -> bool {
        self.severity() < ErrorSeverity::Critical
    }
}

/// Error category for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Invalid configuration
    Config = 0,
    /// Numerical failure inside a cycle
    Numerical = 1,
    /// Estimate query failure
    Query = 2,
    /// Estimator lifecycle misuse
    Lifecycle = 3,
    /// Sensor provider failure
    Sensor = 4,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "Config"),
            ErrorCategory::Numerical => write!(f, "Numerical"),
            ErrorCategory::Query => write!(f, "Query"),
            ErrorCategory::Lifecycle => write!(f, "Lifecycle"),
            ErrorCategory::Sensor => write!(f, "Sensor"),
        }
    }
}

/// Error severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ErrorSeverity {
    /// Informational, no action required
    Info = 0,
    /// Warning, the affected estimate is unavailable for this cycle
    Warning = 1,
    /// Error, the operation failed
    Error = 2,
    /// Critical, the estimator cannot continue
    Critical = 3,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
