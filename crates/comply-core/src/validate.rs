//! Field-level validation helpers shared by request DTOs.

use crate::error::ValidationError;

/// Default upper bound for short text fields (names, titles, references).
pub const MAX_SHORT_TEXT: usize = 255;

/// Upper bound for long-form text (descriptions, answers, guidance).
pub const MAX_LONG_TEXT: usize = 20_000;

/// Require a non-blank value no longer than `max` characters.
pub fn required(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field));
    }
    bounded(field, value, max)
}

/// Validate an optional value: when present it must be non-blank and bounded.
pub fn optional(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(v) => required(field, v, max),
        None => Ok(()),
    }
}

/// Reject values longer than `max` characters.
pub fn bounded(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Require `value` to lie within the closed unit interval.
pub fn unit_interval(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(ValidationError::OutOfRange {
            field,
            min: 0.0,
            max: 1.0,
            value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_rejects_blank() {
        assert_eq!(required("name", "   ", 10), Err(ValidationError::Empty("name")));
        assert!(required("name", "SOC 2", 10).is_ok());
    }

    #[test]
    fn bounded_counts_characters_not_bytes() {
        // Four multi-byte characters fit a limit of four.
        assert!(bounded("name", "éééé", 4).is_ok());
        assert!(bounded("name", "ééééé", 4).is_err());
    }

    #[test]
    fn optional_skips_absent_values() {
        assert!(optional("notes", None, 5).is_ok());
        assert!(optional("notes", Some(""), 5).is_err());
    }

    #[test]
    fn unit_interval_bounds() {
        assert!(unit_interval("confidence_score", 0.0).is_ok());
        assert!(unit_interval("confidence_score", 1.0).is_ok());
        assert!(unit_interval("confidence_score", -0.01).is_err());
        assert!(unit_interval("confidence_score", f64::NAN).is_err());
    }
}
