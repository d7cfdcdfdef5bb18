//! Part abstraction for the pipeline.
//!
//! Two capability variants:
//! - **`SyncPart`**: computed inline on the tick thread, once per tick.
//! - **`ThreadedPart`**: updated by its own background worker at its own
//!   cadence; the tick only ever reads the latest published tuple.
//!
//! Both carry an optional `shutdown` hook. `AnyPart` wraps either variant so
//! the vehicle can register them uniformly, and the variant decides the
//! execution mode at registration time.

use crate::pipeline::binding::ExecutionMode;
use crate::pipeline::value::Value;
use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a part's own code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PartError {
    #[error("{0}")]
    Failed(String),

    #[error("Hardware fault: {0}")]
    Hardware(String),

    #[error("Panicked: {0}")]
    Panicked(String),
}

impl PartError {
    pub fn failed(message: impl Into<String>) -> Self {
        PartError::Failed(message.into())
    }

    /// Convert a caught panic payload into an error.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        PartError::Panicked(panic_message(payload.as_ref()))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Declared number of input and output values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub inputs: usize,
    pub outputs: usize,
}

impl Arity {
    pub const fn new(inputs: usize, outputs: usize) -> Self {
        Self { inputs, outputs }
    }
}

/// A part computed inline, once per tick, blocking the tick until it returns.
#[cfg_attr(test, mockall::automock)]
pub trait SyncPart: Send {
    /// Compute this tick's outputs from the gathered inputs.
    ///
    /// Must return exactly as many values as the binding declares output keys.
    fn compute(&mut self, inputs: &[Value]) -> Result<Vec<Value>, PartError>;

    /// Declared arity, checked against the binding at registration.
    fn arity(&self) -> Option<Arity> {
        None
    }

    /// Called once when the vehicle stops.
    fn shutdown(&mut self) -> Result<(), PartError> {
        Ok(())
    }
}

/// A part with its own background loop.
///
/// The worker calls `update` repeatedly with the latest inputs the tick
/// handed over, publishing each returned tuple atomically. Between calls it
/// waits for `cadence`, waking early when cancelled.
pub trait ThreadedPart: Send {
    fn update(&mut self, inputs: &[Value]) -> Result<Vec<Value>, PartError>;

    /// Pause between two updates. Zero means update back to back (parts that
    /// block on their device, like a camera waiting for a frame).
    fn cadence(&self) -> Duration {
        Duration::ZERO
    }

    fn arity(&self) -> Option<Arity> {
        None
    }

    fn shutdown(&mut self) -> Result<(), PartError> {
        Ok(())
    }
}

/// Wrapper that holds either part variant.
pub enum AnyPart {
    Sync(Box<dyn SyncPart>),
    Threaded(Box<dyn ThreadedPart>),
}

impl AnyPart {
    pub fn sync(part: impl SyncPart + 'static) -> Self {
        AnyPart::Sync(Box::new(part))
    }

    pub fn threaded(part: impl ThreadedPart + 'static) -> Self {
        AnyPart::Threaded(Box::new(part))
    }

    pub fn mode(&self) -> ExecutionMode {
        match self {
            AnyPart::Sync(_) => ExecutionMode::Synchronous,
            AnyPart::Threaded(_) => ExecutionMode::Threaded,
        }
    }

    pub fn arity(&self) -> Option<Arity> {
        match self {
            AnyPart::Sync(p) => p.arity(),
            AnyPart::Threaded(p) => p.arity(),
        }
    }
}

impl std::fmt::Debug for AnyPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnyPart").field(&self.mode()).finish()
    }
}
