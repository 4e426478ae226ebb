//! Configuration error types.
//!
//! Raised at init time, when a reference link is changed, or when a filter
//! parameter is updated. They are fatal to the call, never to the process.

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Degrees of freedom must be positive
    #[error("Invalid number of degrees of freedom: {0}")]
    InvalidDof(usize),

    /// Link name not present in the kinematic model
    #[error("Unknown link: {0}")]
    UnknownLink(String),

    /// Coupling matrix does not match the joint/motor dimensions
    #[error("{matrix} coupling matrix has shape {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    CouplingShape {
        /// Which coupling matrix
        matrix: &'static str,
        /// Observed rows
        rows: usize,
        /// Observed columns
        cols: usize,
        /// Expected rows (motor dimension)
        expected_rows: usize,
        /// Expected columns (joint dimension)
        expected_cols: usize,
    },

    /// Filter or estimator parameter outside its valid domain
    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Offending value, formatted
        value: String,
    },

    /// Estimator period below the scheduler floor
    #[error("Period {period_ms} ms is below the minimum of {min_ms} ms")]
    PeriodTooShort {
        /// Requested period
        period_ms: f64,
        /// Minimum supported period
        min_ms: f64,
    },

    /// A vector does not have the dimension of its space
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Quantity being checked
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// No sensor provider was supplied
    #[error("Sensor provider missing")]
    MissingSensorProvider,

    /// No kinematic model was supplied while base estimation is enabled
    #[error("Kinematic model missing")]
    MissingKinematicModel,

    /// Configuration source could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Create an invalid parameter error.
    #[must_use]
    pub fn invalid_parameter(name: &'static str, value: impl ToString) -> Self {
        Self::InvalidParameter {
            name,
            value: value.to_string(),
        }
    }

    /// Create a dimension mismatch error.
    #[must_use]
    pub fn dimension_mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            what,
            expected,
            actual,
        }
    }

    /// Create an unknown link error.
    #[must_use]
    pub fn unknown_link(name: impl Into<String>) -> Self {
        Self::UnknownLink(name.into())
    }
}
