//! # vehicle-rs: tick-driven part scheduler for robotic vehicles
//!
//! A vehicle is an ordered list of parts (sensors, controllers, actuators,
//! recorders) wired together through a shared store of named values. The
//! scheduler runs every part once per tick at a target rate, bridging
//! blocking in-loop parts with parts that run on their own background thread.
//!
//! ## Architecture
//!
//! - **Store**: named [`Value`]s, grouped per producing part for atomic publish
//! - **Parts**: [`SyncPart`] (computed inline) and [`ThreadedPart`] (own worker)
//! - **Vehicle**: the loop driver with rate pacing, overrun reporting and an
//!   orderly shutdown in reverse registration order
//! - **Communication**: crossbeam channels for stop requests and telemetry
//!
//! ## Configuration
//!
//! Runtime settings live in a TOML file loaded into [`VehicleConfig`]; every
//! field has a default.
//!
//! ## Example
//!
//! ```ignore
//! use vehicle_rs::{Binding, ConditionPart, Vehicle, VehicleConfig};
//!
//! fn main() -> vehicle_rs::Result<()> {
//!     let mut vehicle = Vehicle::new(VehicleConfig::load_or_default("vehicle.toml"));
//!
//!     vehicle.add_threaded(camera, Binding::new().outputs(["cam/image_array"]))?;
//!     vehicle.add_sync(
//!         ConditionPart::not_equal("user"),
//!         Binding::new().inputs(["user/mode"]).outputs(["run_pilot"]),
//!     )?;
//!     vehicle.add_sync(
//!         pilot,
//!         Binding::new()
//!             .inputs(["cam/image_array"])
//!             .outputs(["pilot/angle", "pilot/throttle"])
//!             .run_condition("run_pilot"),
//!     )?;
//!
//!     let summary = vehicle.run()?;
//!     println!("{} ticks at {:.1} Hz", summary.ticks(), summary.stats.observed_hz);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use config::{LogConfig, VehicleConfig};
pub use error::{Result, ResultExt, VehicleError};
pub use pipeline::{
    AnyPart, Binding, ConditionPart, EventReceiver, FnPart, PartError, PipelineError,
    PollingPart, SharedStore, StopHandle, SyncPart, ThreadedPart, Value, ValueKind, Vehicle,
    VehicleEvent,
};
pub use types::{LoopStats, RunSummary, SchedulerState};
