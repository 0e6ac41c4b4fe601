//! Shared range-validation helpers for scores and thresholds.
//!
//! Review scores are integers on a 1-10 scale; confidence values and
//! self-assessments live in the unit interval; image quality scores are
//! decimals on a 1.0-10.0 scale.

use crate::error::CoreError;

/// Minimum value for a 1-10 review score.
pub const SCORE_MIN: i32 = 1;

/// Maximum value for a 1-10 review score.
pub const SCORE_MAX: i32 = 10;

/// Minimum image quality score.
pub const QUALITY_MIN: f64 = 1.0;

/// Maximum image quality score.
pub const QUALITY_MAX: f64 = 10.0;

/// Default batch quality-gate threshold.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 7.0;

/// Validate that a value is a finite number within `[0.0, 1.0]`.
pub fn validate_unit_range(value: f64, field: &str) -> Result<(), CoreError> {
    if !value.is_finite() {
        return Err(CoreError::Validation(format!(
            "{field} must be a finite number"
        )));
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(CoreError::Validation(format!(
            "{field} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

/// Validate that an integer review score is within `[1, 10]`.
pub fn validate_score_range(value: i32, field: &str) -> Result<(), CoreError> {
    if !(SCORE_MIN..=SCORE_MAX).contains(&value) {
        return Err(CoreError::Validation(format!(
            "{field} must be between {SCORE_MIN} and {SCORE_MAX}, got {value}"
        )));
    }
    Ok(())
}

/// Validate that an image quality score is within `[1.0, 10.0]`.
pub fn validate_quality_score(value: f64, field: &str) -> Result<(), CoreError> {
    if !value.is_finite() {
        return Err(CoreError::Validation(format!(
            "{field} must be a finite number"
        )));
    }
    if !(QUALITY_MIN..=QUALITY_MAX).contains(&value) {
        return Err(CoreError::Validation(format!(
            "{field} must be between {QUALITY_MIN} and {QUALITY_MAX}, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_range_accepts_bounds() {
        assert!(validate_unit_range(0.0, "confidence").is_ok());
        assert!(validate_unit_range(0.5, "confidence").is_ok());
        assert!(validate_unit_range(1.0, "confidence").is_ok());
    }

    #[test]
    fn unit_range_rejects_out_of_bounds() {
        assert!(validate_unit_range(-0.01, "confidence").is_err());
        assert!(validate_unit_range(1.01, "confidence").is_err());
    }

    #[test]
    fn unit_range_rejects_non_finite() {
        assert!(validate_unit_range(f64::NAN, "confidence").is_err());
        assert!(validate_unit_range(f64::INFINITY, "confidence").is_err());
    }

    #[test]
    fn score_range_accepts_bounds() {
        assert!(validate_score_range(1, "overall_quality").is_ok());
        assert!(validate_score_range(10, "overall_quality").is_ok());
    }

    #[test]
    fn score_range_rejects_out_of_bounds() {
        let err = validate_score_range(0, "overall_quality").unwrap_err();
        assert!(err.to_string().contains("overall_quality"));
        assert!(validate_score_range(11, "overall_quality").is_err());
    }

    #[test]
    fn quality_score_accepts_bounds() {
        assert!(validate_quality_score(1.0, "quality_score").is_ok());
        assert!(validate_quality_score(7.5, "quality_score").is_ok());
        assert!(validate_quality_score(10.0, "quality_score").is_ok());
    }

    #[test]
    fn quality_score_rejects_out_of_bounds() {
        assert!(validate_quality_score(0.9, "quality_score").is_err());
        assert!(validate_quality_score(10.1, "quality_score").is_err());
        assert!(validate_quality_score(f64::NAN, "quality_score").is_err());
    }

    #[test]
    fn default_threshold_is_within_range() {
        assert!(validate_quality_score(DEFAULT_QUALITY_THRESHOLD, "threshold").is_ok());
    }
}
