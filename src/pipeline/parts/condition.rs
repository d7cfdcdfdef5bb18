//! ConditionPart: turns one input into a boolean run condition.
//!
//! The usual use is deriving a gate from a mode key, for example running the
//! pilot only when the drive mode is not `"user"`:
//!
//! ```ignore
//! vehicle.add_sync(
//!     ConditionPart::not_equal("user"),
//!     Binding::new().inputs(["user/mode"]).outputs(["run_pilot"]),
//! )?;
//! ```
//!
//! An absent input always yields `false`, so a gate stays closed until its
//! source has published something.

use crate::pipeline::part::{Arity, PartError, SyncPart};
use crate::pipeline::value::Value;

type Predicate = Box<dyn Fn(&Value) -> bool + Send>;

pub struct ConditionPart {
    predicate: Predicate,
}

impl ConditionPart {
    pub fn new(predicate: impl Fn(&Value) -> bool + Send + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }

    pub fn equals(expected: impl Into<Value>) -> Self {
        let expected = expected.into();
        Self::new(move |v| *v == expected)
    }

    pub fn not_equal(rejected: impl Into<Value>) -> Self {
        let rejected = rejected.into();
        Self::new(move |v| *v != rejected)
    }

    /// Truthiness of a boolean or numeric input.
    pub fn truthy() -> Self {
        Self::new(|v| match v {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Binary(b) => !b.is_empty(),
            Value::Absent => false,
        })
    }
}

impl SyncPart for ConditionPart {
    fn compute(&mut self, inputs: &[Value]) -> Result<Vec<Value>, PartError> {
        let open = match inputs.first() {
            None | Some(Value::Absent) => false,
            Some(value) => (self.predicate)(value),
        };
        Ok(vec![Value::Bool(open)])
    }

    fn arity(&self) -> Option<Arity> {
        Some(Arity::new(1, 1))
    }
}
