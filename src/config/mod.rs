//! Configuration module for vehicle-rs
//!
//! A vehicle is described by a single TOML file. Every field has a default,
//! so an empty file (or no file at all) yields a runnable configuration.
//!
//! # Example
//!
//! ```toml
//! drive_loop_hz = 20.0
//! max_loops = 100000
//! shutdown_budget_ms = 1000
//! profile = true
//! profile_output = "logs/profile.json"
//!
//! [log]
//! filter = "info,vehicle_rs=debug"
//! log_dir = "logs"
//! ```
//!
//! ```ignore
//! use vehicle_rs::config::VehicleConfig;
//!
//! let config = VehicleConfig::load_or_default("vehicle.toml");
//! let mut vehicle = Vehicle::new(config);
//! ```

use crate::error::{Result, VehicleError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default tick rate in Hz
pub const DEFAULT_DRIVE_LOOP_HZ: f64 = 20.0;

/// Default per-hook shutdown budget in milliseconds
pub const DEFAULT_SHUTDOWN_BUDGET_MS: u64 = 1000;

/// Default per-worker join grace in milliseconds
pub const DEFAULT_WORKER_GRACE_MS: u64 = 500;

/// Default log filter when neither the config nor `RUST_LOG` sets one
pub const DEFAULT_LOG_FILTER: &str = "info,vehicle_rs=debug";

/// Vehicle runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Target tick rate in Hz
    pub drive_loop_hz: f64,

    /// Stop after this many ticks (unbounded when absent)
    pub max_loops: Option<u64>,

    /// Time each shutdown hook may take before it is abandoned
    pub shutdown_budget_ms: u64,

    /// Time each threaded worker may take to exit after cancellation
    pub worker_grace_ms: u64,

    /// Smoothing factor of the observed rate, in (0, 1]
    pub rate_smoothing: f64,

    /// Interval between periodic `Stats` events
    pub stats_interval_ms: u64,

    /// Capacity of the telemetry channel
    pub event_buffer_size: usize,

    /// Collect per-part timings
    pub profile: bool,

    /// Write the profile report here as JSON at stop
    pub profile_output: Option<PathBuf>,

    /// Minimum interval between overrun warnings; the rest go to debug
    pub overrun_log_interval_ms: u64,

    /// Logging setup used by the binary
    pub log: LogConfig,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            drive_loop_hz: DEFAULT_DRIVE_LOOP_HZ,
            max_loops: None,
            shutdown_budget_ms: DEFAULT_SHUTDOWN_BUDGET_MS,
            worker_grace_ms: DEFAULT_WORKER_GRACE_MS,
            rate_smoothing: 0.1,
            stats_interval_ms: 500,
            event_buffer_size: 1024,
            profile: false,
            profile_output: None,
            overrun_log_interval_ms: 1000,
            log: LogConfig::default(),
        }
    }
}

impl VehicleConfig {
    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VehicleError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            VehicleError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load vehicle config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| VehicleError::Serialization(format!("vehicle config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| VehicleError::Config(format!("Failed to write {}: {}", path.display(), e)))
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.drive_loop_hz.is_finite() || self.drive_loop_hz <= 0.0 {
            return Err(VehicleError::Config(format!(
                "drive_loop_hz must be a positive finite number, got {}",
                self.drive_loop_hz
            )));
        }
        if !(self.rate_smoothing > 0.0 && self.rate_smoothing <= 1.0) {
            return Err(VehicleError::Config(format!(
                "rate_smoothing must be in (0, 1], got {}",
                self.rate_smoothing
            )));
        }
        if self.event_buffer_size == 0 {
            return Err(VehicleError::Config(
                "event_buffer_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn shutdown_budget(&self) -> Duration {
        Duration::from_millis(self.shutdown_budget_ms)
    }

    pub fn worker_grace(&self) -> Duration {
        Duration::from_millis(self.worker_grace_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn overrun_log_interval(&self) -> Duration {
        Duration::from_millis(self.overrun_log_interval_ms)
    }
}

/// Logging setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    pub filter: String,

    /// Also write a daily rolling log file here
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
        }
    }
}
