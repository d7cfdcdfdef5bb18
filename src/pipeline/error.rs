//! Pipeline-specific error types.

use crate::pipeline::binding::BindingLabel;
use crate::pipeline::value::ValueKind;
use thiserror::Error;

/// Errors that can occur within the pipeline system.
///
/// Configuration errors are raised at registration or start and prevent the
/// vehicle from running. `Compute` is the only runtime error that reaches the
/// caller of `start`; worker failures and overruns are logged instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Configuration error in {binding}: {message}")]
    Configuration {
        binding: BindingLabel,
        message: String,
    },

    #[error("Arity mismatch in {binding}: expected {expected} values, got {found}")]
    ArityMismatch {
        binding: BindingLabel,
        expected: usize,
        found: usize,
    },

    #[error("Output key '{key}' is written by both {first} and {second}")]
    DuplicateOutput {
        key: String,
        first: BindingLabel,
        second: BindingLabel,
    },

    #[error(
        "Type mismatch on key '{key}'{}: holds {expected}, publish was {found}",
        .binding.as_ref().map(|b| format!(" from {}", b)).unwrap_or_default()
    )]
    TypeMismatch {
        /// Publishing binding, when the publish came from a tick
        binding: Option<BindingLabel>,
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("Run condition '{key}' of {binding} must be a bool, found {found}")]
    RunConditionType {
        binding: BindingLabel,
        key: String,
        found: ValueKind,
    },

    #[error("Unknown key '{0}'")]
    UnknownKey(String),

    #[error("Cannot publish {values} values to {keys} keys")]
    LengthMismatch { keys: usize, values: usize },

    #[error("Part {binding} failed on tick {tick}: {message}")]
    Compute {
        binding: BindingLabel,
        tick: u64,
        message: String,
    },

    #[error("Invalid target rate: {0} Hz")]
    InvalidRate(f64),

    #[error("Vehicle cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
}

impl PipelineError {
    /// Binding this error is attributed to, if any.
    pub fn binding(&self) -> Option<&BindingLabel> {
        match self {
            PipelineError::Configuration { binding, .. }
            | PipelineError::ArityMismatch { binding, .. }
            | PipelineError::RunConditionType { binding, .. }
            | PipelineError::Compute { binding, .. } => Some(binding),
            PipelineError::DuplicateOutput { second, .. } => Some(second),
            PipelineError::TypeMismatch { binding, .. } => binding.as_ref(),
            _ => None,
        }
    }

    /// Whether the wiring itself is wrong, as opposed to a part misbehaving or
    /// the vehicle being driven incorrectly.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::Configuration { .. }
                | PipelineError::ArityMismatch { .. }
                | PipelineError::DuplicateOutput { .. }
                | PipelineError::TypeMismatch { .. }
                | PipelineError::RunConditionType { .. }
        )
    }

    /// Attribute a store error to the binding whose publish caused it.
    pub(crate) fn published_by(self, label: &BindingLabel) -> Self {
        match self {
            PipelineError::TypeMismatch {
                binding: None,
                key,
                expected,
                found,
            } => PipelineError::TypeMismatch {
                binding: Some(label.clone()),
                key,
                expected,
                found,
            },
            other => other,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::PartId;

    #[test]
    fn test_compute_error_names_binding() {
        let err = PipelineError::Compute {
            binding: BindingLabel::new(PartId(3), "Pilot"),
            tick: 3,
            message: "boom".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("#3 Pilot"));
        assert!(text.contains("tick 3"));
        assert!(!err.is_configuration());
        assert_eq!(err.binding().map(|b| b.name.as_str()), Some("Pilot"));
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = PipelineError::TypeMismatch {
            binding: None,
            key: "user/angle".to_string(),
            expected: ValueKind::Number,
            found: ValueKind::Text,
        };
        assert_eq!(
            err.to_string(),
            "Type mismatch on key 'user/angle': holds number, publish was text"
        );
        assert!(err.is_configuration());

        let err = err.published_by(&BindingLabel::new(PartId(2), "Mixer"));
        assert_eq!(
            err.to_string(),
            "Type mismatch on key 'user/angle' from #2 Mixer: holds number, publish was text"
        );
        assert_eq!(err.binding().map(|b| b.name.as_str()), Some("Mixer"));
    }

    #[test]
    fn test_configuration_class() {
        let label = BindingLabel::new(PartId(0), "Camera");
        let wiring = [
            PipelineError::Configuration {
                binding: label.clone(),
                message: "empty key".to_string(),
            },
            PipelineError::ArityMismatch {
                binding: label.clone(),
                expected: 1,
                found: 2,
            },
            PipelineError::DuplicateOutput {
                key: "cam/image".to_string(),
                first: label.clone(),
                second: label.clone(),
            },
            PipelineError::RunConditionType {
                binding: label.clone(),
                key: "mode".to_string(),
                found: ValueKind::Text,
            },
        ];
        assert!(wiring.iter().all(PipelineError::is_configuration));

        let other = [
            PipelineError::UnknownKey("x".to_string()),
            PipelineError::LengthMismatch { keys: 1, values: 2 },
            PipelineError::InvalidRate(0.0),
            PipelineError::InvalidState {
                action: "start",
                state: "stopped",
            },
        ];
        assert!(!other.iter().any(PipelineError::is_configuration));
    }
}
