//! Estimate query and subscription errors.

use crate::common::ErrorSeverity;

/// Errors returned to callers of the estimate query API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Channel id outside the estimate list
    #[error("Unknown channel {channel} for estimate {estimate}")]
    UnknownChannel {
        /// Estimate type name
        estimate: &'static str,
        /// Requested numeric id
        channel: usize,
    },

    /// Channel name cannot be resolved by the sensor provider
    #[error("Unknown channel name: {0}")]
    UnknownChannelName(String),

    /// Channel is already in the estimate list
    #[error("Channel '{name}' already registered for estimate {estimate}")]
    AlreadyRegistered {
        /// Estimate type name
        estimate: &'static str,
        /// Channel name
        name: String,
    },

    /// Channel is not in the estimate list
    #[error("Channel '{name}' not registered for estimate {estimate}")]
    NotRegistered {
        /// Estimate type name
        estimate: &'static str,
        /// Channel name
        name: String,
    },

    /// The sensor provider failed to deliver a reading
    #[error("Sensor read failed: {reason}")]
    SensorRead {
        /// Provider supplied reason
        reason: String,
    },

    /// The estimate type is not produced by this estimator
    #[error("Estimate type {0} is not supported")]
    Unsupported(&'static str),
}

impl QueryError {
    /// Create an unknown channel error.
    #[must_use]
    pub fn unknown_channel(estimate: &'static str, channel: usize) -> Self {
        Self::UnknownChannel { estimate, channel }
    }

    /// Create a sensor read error.
    #[must_use]
    pub fn sensor_read(reason: impl Into<String>) -> Self {
        Self::SensorRead {
            reason: reason.into(),
        }
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            QueryError::SensorRead { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_channel_message() {
        let err = QueryError::unknown_channel("joint_velocity", 7);
        assert!(err.to_string().contains("7"));
        assert!(err.to_string().contains("joint_velocity"));
    }

    #[test]
    fn test_sensor_read_is_warning() {
        assert_eq!(
            QueryError::sensor_read("stale").severity(),
            ErrorSeverity::Warning
        );
        assert_eq!(
            QueryError::Unsupported("base_acceleration").severity(),
            ErrorSeverity::Error
        );
    }
}
