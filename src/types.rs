//! Core data types for vehicle-rs
//!
//! This module contains the run-level types shared by the scheduler, the
//! telemetry bridge and the binary.
//!
//! # Main Types
//!
//! - [`SchedulerState`] - The `Idle → Running → Stopping → Stopped` lifecycle
//! - [`TimingStats`] - O(1) running min/avg/max over durations
//! - [`LoopStats`] - Tick loop statistics (rate, overruns, jitter, failures)
//! - [`RunSummary`] - What a finished run reports back to its caller
//!
//! # Observed Rate
//!
//! The observed tick rate is an exponential moving average of the
//! instantaneous rate `1 / period`, where the period is measured between the
//! starts of two consecutive ticks. With trivial parts it converges to the
//! target rate within a few dozen ticks.

use crate::pipeline::profiler::ProfileReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle of a vehicle. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Stopping => "stopping",
            SchedulerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running statistics over durations, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingStats {
    /// Current count of samples
    pub count: u64,
    /// Running sum for average calculation
    pub total_us: u64,
    /// Current minimum
    pub min_us: u64,
    /// Current maximum
    pub max_us: u64,
}

impl TimingStats {
    /// Create a new empty stats tracker
    pub fn new() -> Self {
        Self {
            count: 0,
            total_us: 0,
            min_us: u64::MAX,
            max_us: 0,
        }
    }

    /// Add a new sample
    #[inline]
    pub fn push(&mut self, sample: Duration) {
        let us = sample.as_micros() as u64;
        self.count += 1;
        self.total_us = self.total_us.saturating_add(us);
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);
    }

    /// Average in microseconds (0 if empty)
    pub fn avg_us(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_us as f64 / self.count as f64
        }
    }

    /// Minimum in microseconds (0 if empty)
    pub fn min_or_zero(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.min_us
        }
    }

    /// Spread between the slowest and fastest sample
    pub fn jitter_us(&self) -> u64 {
        self.max_us.saturating_sub(self.min_or_zero())
    }
}

impl Default for TimingStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the tick loop, reported periodically and at stop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopStats {
    /// Completed ticks
    pub ticks: u64,
    /// Requested rate in Hz
    pub target_hz: f64,
    /// Smoothed observed rate in Hz
    pub observed_hz: f64,
    /// Ticks whose execution exceeded the target period
    pub overruns: u64,
    /// Time spent executing bindings per tick (excludes pacing)
    pub tick_time: TimingStats,
    /// Threaded part failures isolated by their adapters
    pub worker_failures: u64,
    /// Telemetry events dropped because the subscriber lagged
    pub dropped_events: u64,
}

impl LoopStats {
    pub fn new(target_hz: f64) -> Self {
        Self {
            target_hz,
            ..Default::default()
        }
    }

    /// Fold one measured tick period into the smoothed rate.
    pub fn observe_period(&mut self, period: Duration, smoothing: f64) {
        let secs = period.as_secs_f64();
        if secs <= 0.0 {
            return;
        }
        let instant_hz = 1.0 / secs;
        self.observed_hz = if self.observed_hz == 0.0 {
            instant_hz
        } else {
            self.observed_hz + smoothing * (instant_hz - self.observed_hz)
        };
    }

    /// Percentage of ticks that overran
    pub fn overrun_rate(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            (self.overruns as f64 / self.ticks as f64) * 100.0
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Final state (always `Stopped` once `start` returns)
    pub state: SchedulerState,
    /// Wall time from `Running` to `Stopped`
    pub elapsed: Duration,
    /// Loop statistics at stop
    pub stats: LoopStats,
    /// Per-part profile, if profiling was enabled
    pub profile: Option<ProfileReport>,
    /// Shutdown hooks that failed or overran their budget
    pub failed_hooks: u64,
    /// Workers abandoned after their grace period
    pub abandoned_workers: u64,
}

impl RunSummary {
    pub fn ticks(&self) -> u64 {
        self.stats.ticks
    }
}
