//! Built-in parts for wiring vehicles without writing a part type.

pub mod condition;
pub mod fn_part;
pub mod polling;

pub use condition::ConditionPart;
pub use fn_part::FnPart;
pub use polling::PollingPart;
