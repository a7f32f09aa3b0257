//! Error types for vacuum analysis.
//!
//! Numerically weak fits are not errors: they come back as results with
//! `converged == false` and a zero quality. Everything here is a structural
//! failure the caller has to act on.

use thiserror::Error;

/// Errors returned by the analyzers and the comparison engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Too few usable points for the requested window or method.
    #[error("insufficient data for {operation}: need at least {required} points, got {actual}")]
    InsufficientData {
        operation: &'static str,
        required: usize,
        actual: usize,
    },

    /// A pressure-domain analyzer received a value ≤ 0.
    #[error("non-positive value {value} at index {index}")]
    NonPositiveValue { index: usize, value: f64 },

    /// Malformed configuration or argument.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// No alignment strategy could be applied to the pair of series.
    #[error("alignment failed: {0}")]
    AlignmentFailure(String),
}

impl AnalysisError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn alignment(reason: impl Into<String>) -> Self {
        Self::AlignmentFailure(reason.into())
    }

    pub(crate) fn insufficient(operation: &'static str, required: usize, actual: usize) -> Self {
        Self::InsufficientData {
            operation,
            required,
            actual,
        }
    }
}

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;
