//! Prelude module for convenient error handling imports.
//!
//! ```
//! use wholebody_errors::prelude::*;
//!
//! fn lookup(channel: usize, len: usize) -> Result<usize> {
//!     if channel >= len {
//!         return Err(QueryError::unknown_channel("joint_position", channel).into());
//!     }
//!     Ok(channel)
//! }
//!
//! assert!(lookup(3, 2).is_err());
//! ```

pub use crate::{
    Result,
    common::{ErrorCategory, ErrorSeverity, WholeBodyError},
    config::ConfigError,
    lifecycle::LifecycleError,
    numerical::NumericalError,
    query::QueryError,
};
