//! Duration literals for `wait` handlers.
//!
//! A literal is a decimal number (optional sign, fraction and exponent)
//! immediately followed by one of the units `ms`, `s` or `m`.

use crate::error::CompileError;
use std::time::Duration;

/// Parses a literal such as `100ms`, `1.5s` or `2m`.
pub fn parse_duration(literal: &str) -> Result<Duration, CompileError> {
    let split = number_len(literal);
    let (number, suffix) = literal.split_at(split);

    let invalid = |reason: &str| CompileError::InvalidDuration {
        literal: literal.to_string(),
        reason: reason.to_string(),
    };

    if number.is_empty() {
        return Err(invalid("missing number"));
    }
    if number.ends_with('.') {
        return Err(invalid("trailing decimal point"));
    }

    let factor = match suffix {
        "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        _ if suffix.starts_with('.') => return Err(invalid("multiple decimal points")),
        _ => {
            return Err(CompileError::UnsupportedUnit {
                literal: literal.to_string(),
                suffix: suffix.to_string(),
            })
        }
    };

    let value: f64 = number.parse().map_err(|_| invalid("malformed number"))?;
    let millis = value * factor;
    if !millis.is_finite() {
        return Err(invalid("not a finite number"));
    }
    if millis < 0.0 {
        return Err(invalid("negative duration"));
    }

    Ok(Duration::from_nanos((millis * 1_000_000.0).round() as u64))
}

/// Length of the leading numeric part of `s`.
fn number_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut pos = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        pos += 1;
    }
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    // Exponent only when it is followed by digits, so "5e" stays a suffix.
    if pos < bytes.len() && matches!(bytes[pos], b'e' | b'E') {
        let mut exp = pos + 1;
        if exp < bytes.len() && matches!(bytes[exp], b'+' | b'-') {
            exp += 1;
        }
        let digits_start = exp;
        while exp < bytes.len() && bytes[exp].is_ascii_digit() {
            exp += 1;
        }
        if exp > digits_start {
            pos = exp;
        }
    }

    pos
}

/// Formats a duration the way it would be written in a `wait` handler.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_nanos() as f64 / 1_000_000.0;
    if millis >= 60_000.0 && millis % 60_000.0 == 0.0 {
        format!("{}m", millis / 60_000.0)
    } else if millis >= 1_000.0 && millis % 1_000.0 == 0.0 {
        format!("{}s", millis / 1_000.0)
    } else {
        format!("{}ms", millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("3m").unwrap(), Duration::from_secs(180));
    }

    #[test]
    fn test_fraction_and_exponent() {
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1e3ms").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("+10ms").unwrap(), Duration::from_millis(10));
    }

    #[test]
    fn test_unsupported_suffix() {
        let err = parse_duration("10h").unwrap_err();
        assert_eq!(
            err,
            CompileError::UnsupportedUnit {
                literal: "10h".to_string(),
                suffix: "h".to_string(),
            }
        );
        assert!(matches!(
            parse_duration("10"),
            Err(CompileError::UnsupportedUnit { .. })
        ));
        assert!(matches!(
            parse_duration("5ems"),
            Err(CompileError::UnsupportedUnit { .. })
        ));
    }

    #[test]
    fn test_malformed_numbers() {
        assert!(matches!(
            parse_duration("1.s"),
            Err(CompileError::InvalidDuration { .. })
        ));
        assert!(matches!(
            parse_duration("1.2.3s"),
            Err(CompileError::InvalidDuration { .. })
        ));
        assert!(matches!(
            parse_duration("ms"),
            Err(CompileError::InvalidDuration { .. })
        ));
        assert!(matches!(
            parse_duration("-5ms"),
            Err(CompileError::InvalidDuration { .. })
        ));
        assert!(matches!(
            parse_duration("-s"),
            Err(CompileError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(2)), "2s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m");
    }

    proptest! {
        #[test]
        fn prop_integer_millis(n in 0u64..10_000_000) {
            prop_assert_eq!(parse_duration(&format!("{}ms", n)).unwrap(), Duration::from_millis(n));
        }

        #[test]
        fn prop_integer_seconds(n in 0u64..100_000) {
            prop_assert_eq!(parse_duration(&format!("{}s", n)).unwrap(), Duration::from_secs(n));
        }
    }
}
