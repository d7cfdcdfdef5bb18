//! Tick-driven part pipeline.
//!
//! Parts are registered against named keys in a shared store and executed in
//! registration order, once per tick, at a target rate. Synchronous parts run
//! inline on the tick thread; threaded parts run their own worker and the
//! tick publishes their freshest complete output.
//!
//! # Architecture
//!
//! ```text
//!            ┌─────────────── tick thread ───────────────┐
//! [camera] ──┤ adapter ─► store ─► [pilot] ─► [mixer] ─► store ─► [recorder]
//!  worker    └───────────────────────────────────────────┘
//! ```
//!
//! # Design
//!
//! - **Order is the dependency**: no graph inference; a consumer registered
//!   before its producer sees the previous tick's value.
//! - **Per-group locking**: each binding's outputs form one lock group, so a
//!   publish is atomic without a global lock.
//! - **Asymmetric failure**: a synchronous failure stops the vehicle, a
//!   threaded failure is logged and the stale output kept.
//! - **Dedicated threads**: one worker per threaded part, joined with a grace
//!   period; telemetry leaves through non-blocking crossbeam channels.

pub mod binding;
pub mod bridge;
pub mod compiled_plan;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod id;
pub mod part;
pub mod parts;
pub mod profiler;
pub mod store;
pub mod threaded;
pub mod value;

pub use binding::{Binding, BindingLabel, ExecutionMode, PartBinding};
pub use bridge::{EventReceiver, StopHandle, VehicleEvent};
pub use compiled_plan::{CompiledPlan, PlanStats};
pub use error::{PipelineError, PipelineResult};
pub use executor::Vehicle;
pub use id::{KeySlot, PartId};
pub use part::{AnyPart, Arity, PartError, SyncPart, ThreadedPart};
pub use parts::{ConditionPart, FnPart, PollingPart};
pub use profiler::{PartProfile, ProfileReport};
pub use store::{SharedStore, StoreLayout};
pub use threaded::{JoinOutcome, ThreadedAdapter};
pub use value::{Value, ValueKind};
