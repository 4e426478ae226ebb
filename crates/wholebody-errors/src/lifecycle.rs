//! Estimator state machine errors.

use crate::common::ErrorSeverity;

/// Errors raised when an operation does not fit the estimator lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// Operation requires a successful init first
    #[error("Estimator not initialized")]
    NotInitialized,

    /// Init was called twice
    #[error("Estimator already initialized")]
    AlreadyInitialized,

    /// The cycle was released and cannot be restarted
    #[error("Estimator already released")]
    Released,

    /// Operation requires the periodic worker to be paused
    #[error("Operation requires the estimation worker to be paused")]
    WorkerRunning,

    /// Worker thread could not be spawned or joined
    #[error("Worker thread failure: {0}")]
    Worker(String),

    /// Parameter update queue is full
    #[error("Parameter update queue full")]
    QueueFull,
}

impl LifecycleError {
    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            LifecycleError::Worker(_) => ErrorSeverity::Critical,
            LifecycleError::QueueFull => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_failure_is_critical() {
        let err = LifecycleError::Worker("panicked".into());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.to_string().contains("panicked"));
    }

    #[test]
    fn test_released_message() {
        assert!(LifecycleError::Released.to_string().contains("released"));
    }
}
