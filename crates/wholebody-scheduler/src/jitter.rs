//! Wake-up jitter of the periodic worker.
//!
//! Jitter is the distance between a tick's deadline and the moment the
//! worker actually woke up. Recording is allocation free so it can run on
//! the estimation thread; [`JitterMetrics::summary`] sorts a copy of the
//! recent window and is meant for shutdown reports and diagnostics.

use std::collections::VecDeque;
use std::fmt;

/// Number of recent wake-ups kept for percentiles.
pub const JITTER_WINDOW: usize = 1024;

/// Point-in-time view of the jitter statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JitterSummary {
    /// Ticks recorded since creation or the last reset
    pub ticks: u64,
    /// Ticks whose caller arrived after the deadline
    pub missed: u64,
    /// Jitter of the latest tick (ns)
    pub last_ns: u64,
    /// Largest jitter seen (ns)
    pub max_ns: u64,
    /// Mean jitter over every tick (ns)
    pub mean_ns: f64,
    /// Median over the recent window (ns)
    pub p50_ns: u64,
    /// 99th percentile over the recent window (ns)
    pub p99_ns: u64,
}

impl JitterSummary {
    /// Share of ticks that missed their deadline, in percent.
    #[must_use]
    pub fn missed_percent(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        self.missed as f64 * 100.0 / self.ticks as f64
    }
}

impl fmt::Display for JitterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ticks, {} missed, jitter p50 {} us / p99 {} us / max {} us",
            self.ticks,
            self.missed,
            self.p50_ns / 1_000,
            self.p99_ns / 1_000,
            self.max_ns / 1_000
        )
    }
}

/// Running jitter statistics.
///
/// Totals cover every tick; percentiles cover the last `window` ticks.
#[derive(Debug, Clone)]
pub struct JitterMetrics {
    ticks: u64,
    missed: u64,
    last_ns: u64,
    max_ns: u64,
    sum_ns: u128,
    window: usize,
    recent: VecDeque<u64>,
}

impl Default for JitterMetrics {
    fn default() -> Self {
        Self::with_window(JITTER_WINDOW)
    }
}

impl JitterMetrics {
    /// Statistics over the default [`JITTER_WINDOW`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics keeping the last `window` wake-ups. A zero window keeps
    /// totals only.
    #[must_use]
    pub fn with_window(window: usize) -> Self {
        Self {
            ticks: 0,
            missed: 0,
            last_ns: 0,
            max_ns: 0,
            sum_ns: 0,
            window,
            recent: VecDeque::with_capacity(window),
        }
    }

    /// Record one wake-up.
    pub fn record(&mut self, jitter_ns: u64, missed: bool) {
        self.ticks += 1;
        self.missed += u64::from(missed);
        self.last_ns = jitter_ns;
        self.max_ns = self.max_ns.max(jitter_ns);
        self.sum_ns += u128::from(jitter_ns);

        if self.window == 0 {
            return;
        }
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(jitter_ns);
    }

    /// Ticks recorded so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks that missed their deadline.
    #[must_use]
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Wake-ups currently in the percentile window.
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.recent.len()
    }

    /// Summarize. Allocates a sorted copy of the recent window.
    #[must_use]
    pub fn summary(&self) -> JitterSummary {
        let mut sorted: Vec<u64> = self.recent.iter().copied().collect();
        sorted.sort_unstable();
        let mean_ns = if self.ticks == 0 {
            0.0
        } else {
            self.sum_ns as f64 / self.ticks as f64
        };
        JitterSummary {
            ticks: self.ticks,
            missed: self.missed,
            last_ns: self.last_ns,
            max_ns: self.max_ns,
            mean_ns,
            p50_ns: nearest_rank(&sorted, 50),
            p99_ns: nearest_rank(&sorted, 99),
        }
    }

    /// Forget everything, keeping the window capacity.
    pub fn reset(&mut self) {
        self.ticks = 0;
        self.missed = 0;
        self.last_ns = 0;
        self.max_ns = 0;
        self.sum_ns = 0;
        self.recent.clear();
    }
}

/// Nearest-rank percentile of an ascending slice, 0 when empty.
fn nearest_rank(sorted: &[u64], percent: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (percent * sorted.len()).div_ceil(100).max(1);
    sorted.get(rank - 1).copied().unwrap_or_default()
}
