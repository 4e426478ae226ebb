//! Per-estimate subscription lists.
//!
//! Pure bookkeeping: the cycle computes every channel, the query API only
//! exposes channels listed here.

use std::collections::BTreeMap;

use wholebody_errors::QueryError;

use crate::estimate::{EstimateSpace, EstimateType};

/// A subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Channel name as known to the sensor provider
    pub name: String,
    /// Index in the estimate vector
    pub channel: usize,
}

/// Subscription lists, one per estimate type, in registration order.
#[derive(Debug, Default, Clone)]
pub struct EstimateRegistry {
    lists: BTreeMap<EstimateType, Vec<Subscription>>,
}

impl EstimateRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `name` at `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::AlreadyRegistered`] if `name` is already listed.
    pub fn add(
        &mut self,
        estimate: EstimateType,
        name: &str,
        channel: usize,
    ) -> Result<(), QueryError> {
        let list = self.lists.entry(estimate).or_default();
        if list.iter().any(|s| s.name == name) {
            return Err(QueryError::AlreadyRegistered {
                estimate: estimate.name(),
                name: name.to_owned(),
            });
        }
        list.push(Subscription {
            name: name.to_owned(),
            channel,
        });
        Ok(())
    }

    /// Unsubscribe `name`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotRegistered`] if `name` is not listed.
    pub fn remove(&mut self, estimate: EstimateType, name: &str) -> Result<Subscription, QueryError> {
        let not_registered = || QueryError::NotRegistered {
            estimate: estimate.name(),
            name: name.to_owned(),
        };
        let list = self.lists.get_mut(&estimate).ok_or_else(not_registered)?;
        let index = list
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(not_registered)?;
        Ok(list.remove(index))
    }

    /// Subscriptions of `estimate`.
    #[must_use]
    pub fn list(&self, estimate: EstimateType) -> &[Subscription] {
        self.lists.get(&estimate).map_or(&[], Vec::as_slice)
    }

    /// Number of subscriptions of `estimate`.
    #[must_use]
    pub fn count(&self, estimate: EstimateType) -> usize {
        self.list(estimate).len()
    }

    /// Whether `channel` is subscribed for `estimate`.
    #[must_use]
    pub fn contains_channel(&self, estimate: EstimateType, channel: usize) -> bool {
        self.list(estimate).iter().any(|s| s.channel == channel)
    }

    /// Subscribed channel indices of `estimate`, in registration order.
    pub fn channels(&self, estimate: EstimateType) -> impl Iterator<Item = usize> + '_ {
        self.list(estimate).iter().map(|s| s.channel)
    }

    /// Drop subscriptions that no longer exist after a resize.
    ///
    /// Returns how many were dropped.
    pub fn retain_within(&mut self, joints: usize, motors: usize) -> usize {
        let mut dropped = 0;
        for (estimate, list) in &mut self.lists {
            let limit = match estimate.space() {
                EstimateSpace::Joint => joints,
                EstimateSpace::Motor => motors,
                EstimateSpace::Base => continue,
            };
            let before = list.len();
            list.retain(|s| s.channel < limit);
            dropped += before - list.len();
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_add_and_list_in_order() -> TestResult {
        let mut registry = EstimateRegistry::new();
        registry.add(EstimateType::JointVelocity, "knee", 1)?;
        registry.add(EstimateType::JointVelocity, "hip", 0)?;
        let channels: Vec<_> = registry.channels(EstimateType::JointVelocity).collect();
        assert_eq!(channels, vec![1, 0]);
        assert_eq!(registry.count(EstimateType::JointVelocity), 2);
        assert_eq!(registry.count(EstimateType::JointTorque), 0);
        Ok(())
    }

    #[test]
    fn test_duplicates_rejected() -> TestResult {
        let mut registry = EstimateRegistry::new();
        registry.add(EstimateType::MotorPwm, "m0", 0)?;
        assert!(matches!(
            registry.add(EstimateType::MotorPwm, "m0", 0),
            Err(QueryError::AlreadyRegistered { .. })
        ));
        registry.add(EstimateType::MotorTorque, "m0", 0)?;
        Ok(())
    }

    #[test]
    fn test_remove() -> TestResult {
        let mut registry = EstimateRegistry::new();
        registry.add(EstimateType::JointPosition, "a", 0)?;
        let removed = registry.remove(EstimateType::JointPosition, "a")?;
        assert_eq!(removed.channel, 0);
        assert!(!registry.contains_channel(EstimateType::JointPosition, 0));
        assert!(matches!(
            registry.remove(EstimateType::JointPosition, "a"),
            Err(QueryError::NotRegistered { .. })
        ));
        assert!(registry.remove(EstimateType::BasePose, "base").is_err());
        Ok(())
    }

    #[test]
    fn test_retain_within() -> TestResult {
        let mut registry = EstimateRegistry::new();
        registry.add(EstimateType::JointPosition, "a", 0)?;
        registry.add(EstimateType::JointPosition, "c", 2)?;
        registry.add(EstimateType::MotorPwm, "m1", 1)?;
        registry.add(EstimateType::BasePose, "root_link", 0)?;

        assert_eq!(registry.retain_within(2, 1), 2);
        assert_eq!(registry.count(EstimateType::JointPosition), 1);
        assert_eq!(registry.count(EstimateType::MotorPwm), 0);
        assert_eq!(registry.count(EstimateType::BasePose), 1);
        Ok(())
    }
}
