//! Error handling for vehicle-rs
//!
//! This module defines the crate-level error type and a Result alias for use
//! throughout the application. Pipeline-specific failures live in
//! [`crate::pipeline::error::PipelineError`] and convert into
//! [`VehicleError::Pipeline`].

use crate::pipeline::error::PipelineError;
use thiserror::Error;

/// Main error type for vehicle-rs operations
#[derive(Error, Debug)]
pub enum VehicleError {
    /// Registration, store or compute failures raised by the pipeline
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<VehicleError>,
    },
}

impl VehicleError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        VehicleError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The pipeline error underneath any context layers, if there is one
    pub fn as_pipeline(&self) -> Option<&PipelineError> {
        match self {
            VehicleError::Pipeline(e) => Some(e),
            VehicleError::WithContext { source, .. } => source.as_pipeline(),
            _ => None,
        }
    }
}

/// Result type alias for vehicle-rs operations
pub type Result<T> = std::result::Result<T, VehicleError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| VehicleError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| VehicleError::from(e).with_context(f()))
    }
}
