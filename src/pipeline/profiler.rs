//! Per-part timing profiler.
//!
//! Records how long each binding's step takes on the tick thread (a compute
//! call, or the cache copy of a threaded part) over a rolling window, and
//! renders min/avg/max and tail percentiles when the vehicle stops.

use crate::error::{Result, VehicleError};
use crate::pipeline::binding::BindingLabel;
use crate::types::TimingStats;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

/// Samples kept per part for percentile estimation.
pub const PROFILE_WINDOW: usize = 1000;

struct PartTimings {
    label: BindingLabel,
    stats: TimingStats,
    recent: VecDeque<Duration>,
    skipped: u64,
}

/// Collects step durations for every binding, indexed by registration order.
pub struct PartProfiler {
    parts: Vec<PartTimings>,
}

impl PartProfiler {
    pub fn new<'a>(labels: impl IntoIterator<Item = &'a BindingLabel>) -> Self {
        let parts = labels
            .into_iter()
            .map(|label| PartTimings {
                label: label.clone(),
                stats: TimingStats::new(),
                recent: VecDeque::with_capacity(PROFILE_WINDOW),
                skipped: 0,
            })
            .collect();
        Self { parts }
    }

    #[inline]
    pub fn record(&mut self, index: usize, elapsed: Duration) {
        if let Some(part) = self.parts.get_mut(index) {
            part.stats.push(elapsed);
            if part.recent.len() >= PROFILE_WINDOW {
                part.recent.pop_front();
            }
            part.recent.push_back(elapsed);
        }
    }

    /// Count a tick where the run condition kept the binding idle.
    #[inline]
    pub fn record_skip(&mut self, index: usize) {
        if let Some(part) = self.parts.get_mut(index) {
            part.skipped += 1;
        }
    }

    pub fn report(&self) -> ProfileReport {
        let parts = self
            .parts
            .iter()
            .map(|part| {
                let mut window: Vec<Duration> = part.recent.iter().copied().collect();
                window.sort_unstable();
                PartProfile {
                    index: part.label.id.0,
                    name: part.label.name.clone(),
                    calls: part.stats.count,
                    skipped: part.skipped,
                    min_ms: part.stats.min_or_zero() as f64 / 1000.0,
                    avg_ms: part.stats.avg_us() / 1000.0,
                    max_ms: part.stats.max_us as f64 / 1000.0,
                    p90_ms: percentile_ms(&window, 0.90),
                    p99_ms: percentile_ms(&window, 0.99),
                }
            })
            .collect();

        ProfileReport {
            generated_at: chrono::Utc::now(),
            parts,
        }
    }
}

/// Nearest-rank percentile of a sorted window.
fn percentile_ms(sorted: &[Duration], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((q * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1].as_secs_f64() * 1000.0
}

/// Timing of one part over the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartProfile {
    pub index: u32,
    pub name: String,
    pub calls: u64,
    pub skipped: u64,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

/// Profile of every part, in registration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileReport {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub parts: Vec<PartProfile>,
}

impl ProfileReport {
    /// Render the report as a fixed-width table.
    pub fn table(&self) -> String {
        let mut out = format!(
            "{:<4} {:<24} {:>8} {:>8} {:>9} {:>9} {:>9} {:>9} {:>9}\n",
            "#", "part", "calls", "skipped", "min ms", "avg ms", "max ms", "p90 ms", "p99 ms"
        );
        for p in &self.parts {
            out.push_str(&format!(
                "{:<4} {:<24} {:>8} {:>8} {:>9.3} {:>9.3} {:>9.3} {:>9.3} {:>9.3}\n",
                p.index, p.name, p.calls, p.skipped, p.min_ms, p.avg_ms, p.max_ms, p.p90_ms, p.p99_ms
            ));
        }
        out
    }

    pub fn log(&self) {
        tracing::info!("Part profile:\n{}", self.table());
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| VehicleError::Serialization(format!("profile report: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
