//! Error types for time integration.
//!
//! Every failure in the integration core is fatal for the run: the driver
//! reports it and stops. The variants only exist so the report can say
//! what went wrong.

use thiserror::Error;

use crate::ark::ArkError;
use crate::types::{FieldKind, InstanceIndex};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TimestepError>;

/// Fatal conditions raised by schemes, evaluators and the adaptive stepper.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimestepError {
    /// Invalid or inconsistent configuration, detected before stepping.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An instance slot was referenced beyond the allocated count.
    #[error("Instance {index} out of range: only {available} {kind} instances allocated")]
    InstanceOutOfRange {
        kind: FieldKind,
        index: InstanceIndex,
        available: usize,
    },

    /// Buffer dimensions differ from the field layout.
    #[error("Layout mismatch: expected {expected}, got {actual}")]
    LayoutMismatch { expected: String, actual: String },

    /// An iterative solve did not meet its tolerance within its budget.
    #[error("Convergence failure in {solver} after {iterations} iterations (residual {residual:.3e})")]
    Convergence {
        solver: &'static str,
        iterations: usize,
        residual: f64,
    },

    /// A derived quantity left its valid range.
    #[error("Numerical domain error: {quantity} = {value}")]
    NumericalDomain { quantity: String, value: f64 },

    /// The requested scheme or option is not available.
    #[error("Unsupported configuration: {0}")]
    Unsupported(String),

    /// The RHS evaluator reported a failure.
    #[error("RHS evaluator failed: {0}")]
    Evaluator(String),

    /// The adaptive stepper gave up on a step.
    #[error("Adaptive solver failed at t = {time}: {reason}")]
    SolverFailure { time: f64, reason: String },
}

impl TimestepError {
    /// Create a layout mismatch error.
    pub fn layout_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::LayoutMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a numerical domain error for a named quantity.
    pub fn numerical_domain(quantity: impl Into<String>, value: f64) -> Self {
        Self::NumericalDomain {
            quantity: quantity.into(),
            value,
        }
    }

    /// Whether the error was raised while validating configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Unsupported(_)
                | Self::LayoutMismatch { .. }
                | Self::InstanceOutOfRange { .. }
        )
    }

    /// Whether the error comes from an iterative solve running out of budget.
    pub fn is_convergence(&self) -> bool {
        matches!(self, Self::Convergence { .. } | Self::SolverFailure { .. })
    }
}

impl From<ArkError> for TimestepError {
    fn from(err: ArkError) -> Self {
        match &err {
            ArkError::IllegalInput(_) | ArkError::MemoryFail(_) => Self::Configuration(err.to_string()),
            ArkError::RhsFailed { .. } => Self::Evaluator(err.to_string()),
            ArkError::NonFinite { time } => Self::numerical_domain(format!("adaptive solution at t = {time}"), f64::NAN),
            ArkError::ErrorTestFailure { time, .. }
            | ArkError::ConvergenceFailure { time, .. }
            | ArkError::StepTooSmall { time, .. }
            | ArkError::TooMuchWork { time, .. } => Self::SolverFailure {
                time: *time,
                reason: err.to_string(),
            },
            ArkError::Vector(reason) => Self::SolverFailure {
                time: f64::NAN,
                reason: reason.clone(),
            },
        }
    }
}
