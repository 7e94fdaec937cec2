//! # Error Hierarchy
//!
//! Structured error types for the domain layer, built with `thiserror`.
//! Each variant carries the field or state involved so that the HTTP layer
//! can relay a precise message without re-deriving context.

use thiserror::Error;

/// Input validation failures for domain values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required text field was empty or whitespace only.
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// A text field exceeded its maximum length.
    #[error("{field} must not exceed {max} characters")]
    TooLong {
        /// Name of the offending field.
        field: &'static str,
        /// Maximum permitted length in characters.
        max: usize,
    },

    /// A numeric field fell outside its permitted range.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
        /// The rejected value.
        value: f64,
    },

    /// A field carried a value that is not allowed in context.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Workflow transition failures (evidence review, answer review).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The attempted transition is not valid from the current state.
    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        /// The current state name.
        from: &'static str,
        /// The attempted target state name.
        to: &'static str,
        /// Human-readable reason for the rejection.
        reason: String,
    },

    /// The transition requires reviewer comments that were not supplied.
    #[error("comments are required when moving to {to}")]
    MissingComments {
        /// The target state name.
        to: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_name_the_field() {
        assert_eq!(ValidationError::Empty("name").to_string(), "name must not be empty");
        let err = ValidationError::TooLong {
            field: "title",
            max: 255,
        };
        assert!(err.to_string().contains("title"));
        assert!(err.to_string().contains("255"));
    }

    #[test]
    fn out_of_range_reports_value() {
        let err = ValidationError::OutOfRange {
            field: "confidence_score",
            min: 0.0,
            max: 1.0,
            value: 1.5,
        };
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn transition_error_display() {
        let err = TransitionError::InvalidTransition {
            from: "APPROVED",
            to: "REJECTED",
            reason: "already reviewed".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("APPROVED"));
        assert!(msg.contains("REJECTED"));
        assert!(msg.contains("already reviewed"));
    }
}
