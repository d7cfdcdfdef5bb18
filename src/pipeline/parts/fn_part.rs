//! FnPart: a synchronous part backed by a closure.

use crate::pipeline::part::{Arity, PartError, SyncPart};
use crate::pipeline::value::Value;

type ShutdownFn = Box<dyn FnMut() -> Result<(), PartError> + Send>;

/// Synchronous part whose `compute` is a closure.
///
/// ```ignore
/// let mixer = FnPart::new(|inputs| {
///     let pilot = inputs[0].as_f64().unwrap_or(0.0);
///     Ok(vec![Value::Number(pilot.clamp(-1.0, 1.0))])
/// })
/// .with_arity(1, 1);
/// ```
pub struct FnPart<F> {
    compute: F,
    arity: Option<Arity>,
    on_shutdown: Option<ShutdownFn>,
}

impl<F> FnPart<F>
where
    F: FnMut(&[Value]) -> Result<Vec<Value>, PartError> + Send,
{
    pub fn new(compute: F) -> Self {
        Self {
            compute,
            arity: None,
            on_shutdown: None,
        }
    }

    /// Declare the arity so the binding is checked at registration.
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

impl<F> SyncPart for FnPart<F>
where
    F: FnMut(&[Value]) -> Result<Vec<Value>, PartError> + Send,
{
    fn compute(&mut self, inputs: &[Value]) -> Result<Vec<Value>, PartError> {
        (self.compute)(inputs)
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
