//! Per-cycle numerical failures.
//!
//! These never abort a cycle. The sub-step that produced them is skipped and
//! the previously published value stays in the snapshot.

use crate::common::ErrorSeverity;

/// Numerical failures.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum NumericalError {
    /// The 6x6 base block of the reference-link Jacobian cannot be factorized
    #[error("Base Jacobian block is singular (|det| = {determinant:e})")]
    SingularBaseJacobian {
        /// Magnitude of the block determinant
        determinant: f64,
    },

    /// A computation produced NaN or infinity
    #[error("Non-finite result in {0}")]
    NonFinite(&'static str),
}

impl NumericalError {
    /// Get the error severity.
    pub fn severity(self) -> ErrorSeverity {
        ErrorSeverity::Warning
    }
}
