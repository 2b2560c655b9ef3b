//! Int-or-percent resolution
//!
//! Values are either an absolute count (`5`) or a percentage of a total (`"25%"`).
//! Percentages are resolved against the fleet size.

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntOrPercentError {
    #[error("invalid int-or-percent value {0:?}")]
    Invalid(String),

    #[error("int-or-percent value must not be negative, got {0:?}")]
    Negative(String),
}

/// Validate an int-or-percent value without resolving it
///
/// Valid values are non-negative integers or `"N%"` with N in 0..=100.
pub fn is_valid_int_or_percent(value: &IntOrString) -> bool {
    scaled_value(value, 100, true).is_ok()
}

/// Resolve an int-or-percent value against `total`
///
/// Percentages are rounded up when `round_up` is set, down otherwise.
///
/// # Examples
/// ```ignore
/// assert_eq!(scaled_value(&IntOrString::String("25%".into()), 10, true), Ok(3));
/// assert_eq!(scaled_value(&IntOrString::String("25%".into()), 10, false), Ok(2));
/// assert_eq!(scaled_value(&IntOrString::Int(5), 10, true), Ok(5));
/// ```
pub fn scaled_value(
    value: &IntOrString,
    total: i32,
    round_up: bool,
) -> Result<i32, IntOrPercentError> {
    match value {
        IntOrString::Int(abs) if *abs >= 0 => Ok(*abs),
        IntOrString::Int(abs) => Err(IntOrPercentError::Negative(abs.to_string())),
        IntOrString::String(raw) => {
            let trimmed = raw.trim();
            match trimmed.strip_suffix('%') {
                Some(percent_str) => {
                    let percent: i64 = percent_str
                        .parse()
                        .map_err(|_| IntOrPercentError::Invalid(raw.clone()))?;
                    if percent < 0 {
                        return Err(IntOrPercentError::Negative(raw.clone()));
                    }
                    if percent > 100 {
                        return Err(IntOrPercentError::Invalid(raw.clone()));
                    }
                    let scaled = i64::from(total.max(0)) * percent;
                    let resolved = if round_up {
                        (scaled + 99) / 100
                    } else {
                        scaled / 100
                    };
                    Ok(resolved as i32)
                }
                None => match trimmed.parse::<i32>() {
                    Ok(abs) if abs >= 0 => Ok(abs),
                    Ok(_) => Err(IntOrPercentError::Negative(raw.clone())),
                    Err(_) => Err(IntOrPercentError::Invalid(raw.clone())),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(s: &str) -> IntOrString {
        IntOrString::String(s.to_string())
    }

    #[test]
    fn test_percent_rounds_up() {
        assert_eq!(scaled_value(&pct("25%"), 10, true), Ok(3));
        assert_eq!(scaled_value(&pct("10%"), 5, true), Ok(1));
        assert_eq!(scaled_value(&pct("0%"), 10, true), Ok(0));
        assert_eq!(scaled_value(&pct("100%"), 7, true), Ok(7));
    }

    #[test]
    fn test_percent_rounds_down() {
        assert_eq!(scaled_value(&pct("25%"), 10, false), Ok(2));
        assert_eq!(scaled_value(&pct("10%"), 5, false), Ok(0));
    }

    #[test]
    fn test_absolute_values() {
        assert_eq!(scaled_value(&IntOrString::Int(5), 10, true), Ok(5));
        // Absolute values are not capped by the total
        assert_eq!(scaled_value(&IntOrString::Int(50), 10, true), Ok(50));
        assert_eq!(scaled_value(&pct("4"), 10, true), Ok(4));
    }

    #[test]
    fn test_malformed_values_are_errors() {
        assert!(matches!(
            scaled_value(&pct("abc"), 10, true),
            Err(IntOrPercentError::Invalid(_))
        ));
        assert!(matches!(
            scaled_value(&pct("150%"), 10, true),
            Err(IntOrPercentError::Invalid(_))
        ));
        assert!(matches!(
            scaled_value(&pct("-5%"), 10, true),
            Err(IntOrPercentError::Negative(_))
        ));
        assert!(matches!(
            scaled_value(&IntOrString::Int(-1), 10, true),
            Err(IntOrPercentError::Negative(_))
        ));
    }

    #[test]
    fn test_is_valid_int_or_percent() {
        assert!(is_valid_int_or_percent(&pct("25%")));
        assert!(is_valid_int_or_percent(&IntOrString::Int(0)));
        assert!(is_valid_int_or_percent(&pct("25")));
        assert!(!is_valid_int_or_percent(&pct("101%")));
    }
}
