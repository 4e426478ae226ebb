//! Lock-free cycle counters.
//!
//! The worker increments these from the estimation loop; any thread can take
//! a [`CycleSnapshot`]. Every operation is a single relaxed atomic, so the
//! loop never blocks on a reader.

use core::sync::atomic::{AtomicU64, Ordering};

/// Counter values at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleSnapshot {
    /// Completed estimation cycles
    pub total_cycles: u64,
    /// Ticks that started after their deadline
    pub missed_deadlines: u64,
    /// Cycles whose base pose could not be computed
    pub base_position_failures: u64,
    /// Cycles whose base twist could not be computed (singular Jacobian)
    pub base_velocity_failures: u64,
    /// Failed sensor reads
    pub sensor_read_failures: u64,
    /// Parameter updates applied by the worker
    pub parameter_updates: u64,
    /// Wake-up jitter of the last tick (ns)
    pub last_jitter_ns: u64,
    /// Largest wake-up jitter so far (ns)
    pub max_jitter_ns: u64,
}

impl CycleSnapshot {
    /// Share of ticks that missed their deadline, in percent.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        reason = "counter ratios do not need 64-bit precision"
    )]
    pub fn missed_deadline_percent(&self) -> f64 {
        if self.total_cycles == 0 {
            return 0.0;
        }
        self.missed_deadlines as f64 / self.total_cycles as f64 * 100.0
    }
}

/// Atomic counters shared between the worker and readers.
#[derive(Debug, Default)]
pub struct CycleCounters {
    total_cycles: AtomicU64,
    missed_deadlines: AtomicU64,
    base_position_failures: AtomicU64,
    base_velocity_failures: AtomicU64,
    sensor_read_failures: AtomicU64,
    parameter_updates: AtomicU64,
    last_jitter_ns: AtomicU64,
    max_jitter_ns: AtomicU64,
}

impl CycleCounters {
    /// All counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total_cycles: AtomicU64::new(0),
            missed_deadlines: AtomicU64::new(0),
            base_position_failures: AtomicU64::new(0),
            base_velocity_failures: AtomicU64::new(0),
            sensor_read_failures: AtomicU64::new(0),
            parameter_updates: AtomicU64::new(0),
            last_jitter_ns: AtomicU64::new(0),
            max_jitter_ns: AtomicU64::new(0),
        }
    }

    /// Count a completed cycle.
    #[inline]
    pub fn inc_cycle(&self) {
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the timing of a scheduler tick.
    #[inline]
    pub fn record_tick(&self, jitter_ns: u64, missed: bool) {
        self.last_jitter_ns.store(jitter_ns, Ordering::Relaxed);
        self.max_jitter_ns.fetch_max(jitter_ns, Ordering::Relaxed);
        if missed {
            self.missed_deadlines.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a failed base pose computation.
    #[inline]
    pub fn inc_base_position_failure(&self) {
        self.base_position_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed base twist computation.
    #[inline]
    pub fn inc_base_velocity_failure(&self) {
        self.base_velocity_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed sensor read.
    #[inline]
    pub fn inc_sensor_read_failure(&self) {
        self.sensor_read_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an applied parameter update.
    #[inline]
    pub fn inc_parameter_update(&self) {
        self.parameter_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self) -> CycleSnapshot {
        CycleSnapshot {
            total_cycles: self.total_cycles.load(Ordering::Relaxed),
            missed_deadlines: self.missed_deadlines.load(Ordering::Relaxed),
            base_position_failures: self.base_position_failures.load(Ordering::Relaxed),
            base_velocity_failures: self.base_velocity_failures.load(Ordering::Relaxed),
            sensor_read_failures: self.sensor_read_failures.load(Ordering::Relaxed),
            parameter_updates: self.parameter_updates.load(Ordering::Relaxed),
            last_jitter_ns: self.last_jitter_ns.load(Ordering::Relaxed),
            max_jitter_ns: self.max_jitter_ns.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &self.total_cycles,
            &self.missed_deadlines,
            &self.base_position_failures,
            &self.base_velocity_failures,
            &self.sensor_read_failures,
            &self.parameter_updates,
            &self.last_jitter_ns,
            &self.max_jitter_ns,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
