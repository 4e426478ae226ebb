//! Absolute-deadline scheduler.

use std::time::{Duration, Instant};

use wholebody_errors::ConfigError;

use crate::jitter::JitterMetrics;
use crate::{MIN_PERIOD, SPIN_TAIL};

/// Timing of one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Tick number, starting at 1
    pub count: u64,
    /// Seconds since the scheduler was created, taken at wake-up
    pub elapsed_s: f64,
    /// Seconds since the previous tick woke up
    pub dt_s: f64,
    /// Distance between the deadline and the actual wake-up
    pub jitter_ns: u64,
    /// The caller arrived after the deadline
    pub missed: bool,
}

/// Periodic scheduler waking at absolute deadlines.
///
/// Deadlines advance by exactly one period per tick, so time spent
/// processing a cycle does not push later cycles back. When the caller
/// overruns by more than a whole period the schedule is re-anchored on the
/// current time instead of firing a burst of catch-up ticks.
#[derive(Debug)]
pub struct AbsoluteScheduler {
    period: Duration,
    origin: Instant,
    next_deadline: Instant,
    last_wake: Instant,
    tick_count: u64,
    metrics: JitterMetrics,
}

impl AbsoluteScheduler {
    /// Create a scheduler whose first deadline is one period from now.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PeriodTooShort`] if `period` is below
    /// [`MIN_PERIOD`].
    pub fn with_period(period: Duration) -> Result<Self, ConfigError> {
        check_period(period)?;
        let now = Instant::now();
        Ok(Self {
            period,
            origin: now,
            next_deadline: now + period,
            last_wake: now,
            tick_count: 0,
            metrics: JitterMetrics::new(),
        })
    }

    /// Create a scheduler from a period in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PeriodTooShort`] below [`MIN_PERIOD`] and
    /// [`ConfigError::InvalidParameter`] for a non-finite period.
    pub fn with_period_ms(period_ms: f64) -> Result<Self, ConfigError> {
        Self::with_period(period_from_ms(period_ms)?)
    }

    /// Block until the next deadline and report the tick timing.
    pub fn wait_for_tick(&mut self) -> Tick {
        let arrived = Instant::now();
        let missed = arrived > self.next_deadline;
        if !missed {
            sleep_until(self.next_deadline);
        }

        let wake = Instant::now();
        let jitter_ns = duration_ns(wake.saturating_duration_since(self.next_deadline));
        self.metrics.record(jitter_ns, missed);

        let dt_s = wake.duration_since(self.last_wake).as_secs_f64();
        self.last_wake = wake;
        self.tick_count += 1;

        self.next_deadline += self.period;
        if self.next_deadline <= wake {
            self.next_deadline = wake + self.period;
        }

        Tick {
            count: self.tick_count,
            elapsed_s: wake.duration_since(self.origin).as_secs_f64(),
            dt_s,
            jitter_ns,
            missed,
        }
    }

    /// Restart the schedule one period from now.
    ///
    /// Used after the worker was paused, so the first tick after resuming
    /// is neither counted as missed nor fired immediately.
    pub fn rearm(&mut self) {
        let now = Instant::now();
        self.next_deadline = now + self.period;
        self.last_wake = now;
    }

    /// Change the period; the new value applies from the next deadline on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PeriodTooShort`] if `period` is below
    /// [`MIN_PERIOD`]; the scheduler is unchanged.
    pub fn set_period(&mut self, period: Duration) -> Result<(), ConfigError> {
        check_period(period)?;
        self.period = period;
        Ok(())
    }

    /// Current period.
    #[inline]
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of ticks so far.
    #[inline]
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Jitter statistics.
    #[inline]
    #[must_use]
    pub fn metrics(&self) -> &JitterMetrics {
        &self.metrics
    }
}

/// Convert a period in milliseconds, enforcing [`MIN_PERIOD`].
///
/// # Errors
///
/// Returns [`ConfigError::InvalidParameter`] for a non-finite value and
/// [`ConfigError::PeriodTooShort`] below the floor.
pub fn period_from_ms(period_ms: f64) -> Result<Duration, ConfigError> {
    if !period_ms.is_finite() {
        return Err(ConfigError::invalid_parameter("period_ms", period_ms));
    }
    let min_ms = MIN_PERIOD.as_secs_f64() * 1e3;
    if period_ms < min_ms {
        return Err(ConfigError::PeriodTooShort { period_ms, min_ms });
    }
    Duration::try_from_secs_f64(period_ms / 1e3)
        .map_err(|e| ConfigError::invalid_parameter("period_ms", e))
}

fn check_period(period: Duration) -> Result<(), ConfigError> {
    if period < MIN_PERIOD {
        return Err(ConfigError::PeriodTooShort {
            period_ms: period.as_secs_f64() * 1e3,
            min_ms: MIN_PERIOD.as_secs_f64() * 1e3,
        });
    }
    Ok(())
}

fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Sleep coarsely, then spin through the last [`SPIN_TAIL`].
fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline <= now {
        return;
    }
    let remaining = deadline - now;
    if remaining > SPIN_TAIL {
        std::thread::sleep(remaining - SPIN_TAIL);
    }
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_rejects_period_below_floor() {
        assert!(matches!(
            AbsoluteScheduler::with_period(Duration::from_micros(500)),
            Err(ConfigError::PeriodTooShort { .. })
        ));
        assert!(AbsoluteScheduler::with_period_ms(0.0).is_err());
        assert!(AbsoluteScheduler::with_period_ms(f64::NAN).is_err());
    }

    #[test]
    fn test_accepts_floor_exactly() -> TestResult {
        let scheduler = AbsoluteScheduler::with_period_ms(1.0)?;
        assert_eq!(scheduler.period(), MIN_PERIOD);
        Ok(())
    }

    #[test]
    fn test_ticks_are_spaced_by_period() -> TestResult {
        let mut scheduler = AbsoluteScheduler::with_period(Duration::from_millis(2))?;
        let start = Instant::now();
        let mut last = scheduler.wait_for_tick();
        for _ in 0..4 {
            let tick = scheduler.wait_for_tick();
            assert_eq!(tick.count, last.count + 1);
            assert!(tick.elapsed_s > last.elapsed_s);
            assert!(tick.dt_s > 0.0);
            last = tick;
        }
        assert!(start.elapsed() >= Duration::from_millis(8));
        assert_eq!(scheduler.tick_count(), 5);
        assert_eq!(scheduler.metrics().ticks(), 5);
        Ok(())
    }

    #[test]
    fn test_overrun_is_missed_and_reanchored() -> TestResult {
        let mut scheduler = AbsoluteScheduler::with_period(Duration::from_millis(1))?;
        std::thread::sleep(Duration::from_millis(5));
        let tick = scheduler.wait_for_tick();
        assert!(tick.missed);
        assert_eq!(scheduler.metrics().missed(), 1);

        let next = scheduler.wait_for_tick();
        assert_eq!(next.count, 2);
        Ok(())
    }

    #[test]
    fn test_set_period_validates() -> TestResult {
        let mut scheduler = AbsoluteScheduler::with_period(Duration::from_millis(10))?;
        assert!(scheduler.set_period(Duration::ZERO).is_err());
        assert_eq!(scheduler.period(), Duration::from_millis(10));
        scheduler.set_period(Duration::from_millis(5))?;
        assert_eq!(scheduler.period(), Duration::from_millis(5));
        Ok(())
    }
}
