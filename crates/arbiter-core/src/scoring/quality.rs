//! Quality score bounds validation.

use thiserror::Error;

/// Errors from quality score validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QualityError {
    #[error("quality score {dimension}={value} out of range (must be {min}-{max})")]
    OutOfRange {
        dimension: String,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Validate and bound a quality score.
///
/// Scores are rounded to the nearest integer and must fall within
/// `[min, max]`. `None` passes through: undetected issues are not
/// quality-scored.
pub fn validate_quality_score(
    score: Option<f64>,
    dimension: &str,
    min: i64,
    max: i64,
) -> Result<Option<i64>, QualityError> {
    let Some(raw) = score else {
        return Ok(None);
    };

    let rounded = raw.round() as i64;
    if rounded < min || rounded > max {
        return Err(QualityError::OutOfRange {
            dimension: dimension.to_string(),
            value: rounded,
            min,
            max,
        });
    }
    Ok(Some(rounded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_passes_through() {
        assert_eq!(validate_quality_score(None, "rationale_score", 0, 3), Ok(None));
    }

    #[test]
    fn test_in_range_rounds() {
        assert_eq!(
            validate_quality_score(Some(2.4), "rationale_score", 0, 3),
            Ok(Some(2))
        );
        assert_eq!(
            validate_quality_score(Some(2.5), "rationale_score", 0, 3),
            Ok(Some(3))
        );
    }

    #[test]
    fn test_out_of_range_is_error() {
        assert!(matches!(
            validate_quality_score(Some(4.0), "amendment_score", 0, 3),
            Err(QualityError::OutOfRange { value: 4, .. })
        ));
        assert!(matches!(
            validate_quality_score(Some(-1.0), "amendment_score", 0, 3),
            Err(QualityError::OutOfRange { .. })
        ));
    }
}
