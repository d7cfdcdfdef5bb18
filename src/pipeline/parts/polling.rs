//! PollingPart: a threaded part that polls a closure at a fixed cadence.
//!
//! Useful for devices that are read on their own schedule (an IMU at 100 Hz,
//! an odometer, a serial link) independent of the drive loop rate.

use crate::pipeline::part::{Arity, PartError, ThreadedPart};
use crate::pipeline::value::Value;
use std::time::Duration;

type ShutdownFn = Box<dyn FnMut() -> Result<(), PartError> + Send>;

/// Threaded part calling `poll` every `cadence`.
pub struct PollingPart<F> {
    poll: F,
    cadence: Duration,
    arity: Option<Arity>,
    on_shutdown: Option<ShutdownFn>,
}

impl<F> PollingPart<F>
where
    F: FnMut(&[Value]) -> Result<Vec<Value>, PartError> + Send,
{
    pub fn every(cadence: Duration, poll: F) -> Self {
        Self {
            poll,
            cadence,
            arity: None,
            on_shutdown: None,
        }
    }

    /// Poll at `hz` times per second.
    pub fn at_hz(hz: f64, poll: F) -> Self {
        let cadence = if hz.is_finite() && hz > 0.0 {
            Duration::from_secs_f64(1.0 / hz)
        } else {
            Duration::ZERO
        };
        Self::every(cadence, poll)
    }

    pub fn with_arity(mut self, inputs: usize, outputs: usize) -> Self {
        self.arity = Some(Arity::new(inputs, outputs));
        self
    }

    pub fn on_shutdown(
        mut self,
        hook: impl FnMut() -> Result<(), PartError> + Send + 'static,
    ) -> Self {
        self.on_shutdown = Some(Box::new(hook));
        self
    }
}

impl<F> ThreadedPart for PollingPart<F>
where
    F: FnMut(&[Value]) -> Result<Vec<Value>, PartError> + Send,
{
    fn update(&mut self, inputs: &[Value]) -> Result<Vec<Value>, PartError> {
        (self.poll)(inputs)
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    fn arity(&self) -> Option<Arity> {
        self.arity
    }

    fn shutdown(&mut self) -> Result<(), PartError> {
        match self.on_shutdown.as_mut() {
            Some(hook) => hook(),
            None => Ok(()),
        }
    }
}
