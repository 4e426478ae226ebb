//! Prelude module for convenient imports.
//!
//! ```
//! use wholebody_estimator::prelude::*;
//! ```

pub use crate::config::{CouplingConfig, EstimatorConfig};
pub use crate::counters::CycleSnapshot;
pub use crate::estimate::{EstimateType, EstimationParameter};
pub use crate::sensor::{SensorProvider, SensorQuantity, SharedSensorBuffer};
pub use crate::states::WholeBodyStates;
pub use crate::store::EstimateSnapshot;
pub use wholebody_filters::AdaptiveWindowParams;
