use std::time::{SystemTime, UNIX_EPOCH};

/// Format a reading as the payload sent to the broker.
///
/// Uses the shortest decimal representation that round-trips, without a
/// trailing `.0` for integral values: `23.562`, `5`, `1`. Non-finite values
/// are written `NaN`, `Infinity` and `-Infinity`.
///
/// # Example
/// ```
/// use thermosight_common::value::format_value;
///
/// assert_eq!(format_value(23.562), "23.562");
/// assert_eq!(format_value(1.0), "1");
/// ```
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        // Collapse -0 so the payload never carries a sign for zero.
        return "0".to_string();
    }
    value.to_string()
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch (should never happen in practice).
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_fractional() {
        assert_eq!(format_value(23.562), "23.562");
        assert_eq!(format_value(-4.125), "-4.125");
        assert_eq!(format_value(0.1 + 0.2), "0.30000000000000004");
    }

    #[test]
    fn test_format_integral() {
        assert_eq!(format_value(5.0), "5");
        assert_eq!(format_value(0.0), "0");
        assert_eq!(format_value(-0.0), "0");
        assert_eq!(format_value(1.0), "1");
    }

    #[test]
    fn test_format_non_finite() {
        assert_eq!(format_value(f64::INFINITY), "Infinity");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_value(f64::NAN), "NaN");
    }

    #[test]
    fn test_timestamp_is_positive() {
        assert!(current_timestamp_millis() > 0);
    }
}
