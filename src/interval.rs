use std::time::Duration;

use crate::error::{LokiMcpError, Result};

/// Parses a compact window size such as `5m`, `2h` or `1d`.
pub fn parse_interval(input: &str) -> Result<Duration> {
    let invalid = || LokiMcpError::InvalidIntervalFormat {
        input: input.to_string(),
    };

    let Some(unit) = input.chars().last() else {
        return Err(invalid());
    };
    let secs_per_unit: u64 = match unit {
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        _ => return Err(invalid()),
    };

    let digits = &input[..input.len() - unit.len_utf8()];
    // u64::from_str accepts a leading '+'
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let count: u64 = digits.parse().map_err(|_| invalid())?;
    let secs = count.checked_mul(secs_per_unit).ok_or_else(invalid)?;
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_interval("5m").unwrap(), Duration::from_secs(5 * 60));
        assert_eq!(parse_interval("2h").unwrap(), Duration::from_secs(2 * 3600));
        assert_eq!(parse_interval("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_interval("0m").unwrap(), Duration::ZERO);
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["5x", "m", "", "5", "-5m", "+5m", "1.5h", "h1", "5 m", "99999999999999999999d"] {
            let err = parse_interval(bad).unwrap_err();
            assert!(
                matches!(err, LokiMcpError::InvalidIntervalFormat { ref input } if input == bad),
                "expected InvalidIntervalFormat for {bad:?}, got {err:?}"
            );
        }
    }
}
