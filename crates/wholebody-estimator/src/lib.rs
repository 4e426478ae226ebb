//! Periodic whole-body state estimation.
//!
//! A worker thread runs an [`EstimationCycle`] at a fixed period. Each cycle
//! pulls the latest joint samples from a [`SensorProvider`], differentiates
//! and filters them, maps them to motor space, estimates the floating base,
//! and publishes one consistent [`EstimateSnapshot`] into the
//! [`EstimateStore`]. Any number of threads read that snapshot through
//! [`WholeBodyStates`].
//!
//! # Concurrency
//!
//! - The snapshot is double-buffered: the worker fills its own copy and
//!   swaps it in under a mutex held only for the swap. Readers hold the same
//!   mutex only for their copy.
//! - Filter parameters are changed by [`ParameterUpdate`] messages, applied
//!   by the worker between cycles.
//! - Resizing the degrees of freedom requires a paused worker and runs on
//!   the worker thread.
//! - Blocking reads refresh the sensor before touching the store.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wholebody_estimator::prelude::*;
//!
//! # fn main() -> wholebody_errors::Result<()> {
//! let sensor = Arc::new(SharedSensorBuffer::new(["hip", "knee", "ankle"]));
//! let config = EstimatorConfig::builder().period_ms(5.0).build()?;
//!
//! let mut states = WholeBodyStates::new(sensor.clone());
//! states.set_config(config)?;
//! states.init()?;
//! states.add_estimates(EstimateType::JointVelocity, &["hip", "knee", "ankle"]);
//!
//! sensor.push(SensorQuantity::JointPosition, &[0.0, 0.1, 0.2], 0.005)?;
//! let velocities = states.get_estimates(EstimateType::JointVelocity, 0.0, false)?;
//! assert_eq!(velocities.len(), 3);
//! states.close()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![deny(unused_must_use)]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod counters;
pub mod cycle;
pub mod estimate;
pub mod prelude;
pub mod registry;
pub mod sensor;
pub mod states;
pub mod store;
pub mod thread;

pub use config::{CouplingConfig, EstimatorConfig, EstimatorConfigBuilder};
pub use counters::{CycleCounters, CycleSnapshot};
pub use cycle::{CycleState, EstimationCycle};
pub use estimate::{
    EstimateSpace, EstimateType, EstimationParameter, FilterTarget, ParameterUpdate,
    ParameterValue,
};
pub use registry::{EstimateRegistry, Subscription};
pub use sensor::{SensorProvider, SensorQuantity, SharedSensorBuffer};
pub use states::WholeBodyStates;
pub use store::{EstimateSnapshot, EstimateStore};
pub use thread::{EstimatorThread, WorkerCommand};
