//! Part bindings: which keys a part reads, which it writes, and when it runs.
//!
//! A `Binding` is the user-facing builder handed to `Vehicle::register`; once
//! accepted it becomes an immutable `PartBinding` in registration order.

use crate::pipeline::id::PartId;
use crate::pipeline::part::Arity;
use std::fmt;

/// How a bound part is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Computed inline on the tick thread.
    Synchronous,
    /// Runs its own worker; the tick reads the cached output.
    Threaded,
}

/// Attribution for errors and logs: registration index plus a readable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingLabel {
    pub id: PartId,
    pub name: String,
}

impl BindingLabel {
    pub fn new(id: PartId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for BindingLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id.0, self.name)
    }
}

/// Builder for the keys and gate of one part.
///
/// ```ignore
/// vehicle.register(
///     AnyPart::sync(pilot),
///     Binding::new()
///         .named("pilot")
///         .inputs(["cam/normalized/cropped"])
///         .outputs(["pilot/angle", "pilot/throttle"])
///         .run_condition("run_pilot"),
/// )?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Binding {
    name: Option<String>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    run_condition: Option<String>,
}

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn inputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn outputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn run_condition(mut self, key: impl Into<String>) -> Self {
        self.run_condition = Some(key.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn into_part_binding(
        self,
        id: PartId,
        default_name: &str,
        mode: ExecutionMode,
    ) -> PartBinding {
        let name = self.name.unwrap_or_else(|| default_name.to_string());
        PartBinding {
            label: BindingLabel::new(id, name),
            mode,
            inputs: self.inputs,
            outputs: self.outputs,
            run_condition: self.run_condition,
        }
    }
}

/// An accepted, immutable binding.
#[derive(Debug, Clone)]
pub struct PartBinding {
    pub label: BindingLabel,
    pub mode: ExecutionMode,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub run_condition: Option<String>,
}

impl PartBinding {
    pub fn arity(&self) -> Arity {
        Arity::new(self.inputs.len(), self.outputs.len())
    }

    /// Every key this binding touches, gate included.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .chain(self.run_condition.iter())
            .map(String::as_str)
    }
}

/// Short type name for a part, used when the binding is not named explicitly.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
