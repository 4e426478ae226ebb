//! Error taxonomy for whole-body state estimation.
//!
//! Every crate in the workspace reports failures through the types defined
//! here. The taxonomy mirrors how failures are handled at run time:
//!
//! - [`config`]: configuration errors, detected at init or reconfiguration
//!   time and fatal to that call only
//! - [`numerical`]: per-cycle numerical failures such as a singular base
//!   Jacobian block; non-fatal, the previous estimate is kept
//! - [`query`]: unknown, unregistered or unreadable estimate channels
//! - [`lifecycle`]: misuse of the estimator state machine
//! - [`common`]: the umbrella [`WholeBodyError`] with category and severity
//!
//! # Example
//!
//! ```
//! use wholebody_errors::prelude::*;
//!
//! fn check_dof(dof: usize) -> Result<usize> {
//!     if dof == 0 {
//!         return Err(ConfigError::InvalidDof(dof).into());
//!     }
//!     Ok(dof)
//! }
//!
//! assert!(check_dof(0).is_err());
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod common;
pub mod config;
pub mod lifecycle;
pub mod numerical;
pub mod prelude;
pub mod query;

pub use common::{ErrorCategory, ErrorSeverity, WholeBodyError};
pub use config::ConfigError;
pub use lifecycle::LifecycleError;
pub use numerical::NumericalError;
pub use query::QueryError;

/// A specialized `Result` type for whole-body estimation operations.
pub type Result<T> = std::result::Result<T, WholeBodyError>;
