//! Collector configuration and value parsers.
//!
//! The parsers are used by the daemon's command line (each option can also be
//! set through its environment variable) and reject anything that is not a
//! non-negative number, so a bad value stops the daemon at startup instead of
//! silently disabling a filter.

use std::time::Duration;

/// Error type for invalid configuration values.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Value is not a number of the expected kind.
    NotANumber(String),
    /// Value is negative.
    Negative(String),
    /// Value must be strictly positive (intervals, timeouts).
    NotPositive(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotANumber(v) => write!(f, "'{}' is not a valid number", v),
            ConfigError::Negative(v) => write!(f, "'{}' must not be negative", v),
            ConfigError::NotPositive(v) => write!(f, "'{}' must be greater than zero", v),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Sampling and filtering configuration, fixed for the lifetime of the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Time between the start of two consecutive ticks.
    pub interval: Duration,
    /// Maximum number of processes written per tick. 0 means unlimited.
    pub top_n: usize,
    /// Processes with a smaller RSS are dropped.
    pub min_rss_bytes: u64,
    /// Processes with a smaller CPU percent are dropped.
    pub min_cpu_percent: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            top_n: 0,
            min_rss_bytes: 0,
            min_cpu_percent: 0.0,
        }
    }
}

impl Config {
    /// Checks invariants for a configuration built in code.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::NotPositive(format!(
                "{}",
                self.interval.as_secs_f64()
            )));
        }
        if !self.min_cpu_percent.is_finite() {
            return Err(ConfigError::NotANumber(self.min_cpu_percent.to_string()));
        }
        if self.min_cpu_percent < 0.0 {
            return Err(ConfigError::Negative(self.min_cpu_percent.to_string()));
        }
        Ok(())
    }

    /// Returns true if any threshold or top-N limit is active.
    pub fn filters_enabled(&self) -> bool {
        self.top_n > 0 || self.min_rss_bytes > 0 || self.min_cpu_percent > 0.0
    }
}

/// Parses a positive number of seconds (fractions allowed), e.g. `"1"` or `"0.5"`.
pub fn parse_seconds(s: &str) -> Result<Duration, ConfigError> {
    let secs = parse_non_negative_f64(s)?;
    let duration = Duration::try_from_secs_f64(secs)
        .map_err(|_| ConfigError::NotANumber(s.trim().to_string()))?;
    // Values below one nanosecond round down to zero
    if duration.is_zero() {
        return Err(ConfigError::NotPositive(s.trim().to_string()));
    }
    Ok(duration)
}

/// Parses a non-negative integer count (`TOP_N`, `MIN_RSS_BYTES`).
pub fn parse_count(s: &str) -> Result<u64, ConfigError> {
    let s = s.trim();
    if s.starts_with('-') {
        return Err(ConfigError::Negative(s.to_string()));
    }
    s.parse::<u64>()
        .map_err(|_| ConfigError::NotANumber(s.to_string()))
}

/// Parses a non-negative integer that fits in `usize`.
pub fn parse_limit(s: &str) -> Result<usize, ConfigError> {
    let n = parse_count(s)?;
    usize::try_from(n).map_err(|_| ConfigError::NotANumber(s.trim().to_string()))
}

/// Parses a non-negative percentage (`MIN_CPU_PERCENT`).
pub fn parse_percent(s: &str) -> Result<f64, ConfigError> {
    parse_non_negative_f64(s)
}

fn parse_non_negative_f64(s: &str) -> Result<f64, ConfigError> {
    let s = s.trim();
    let value: f64 = s
        .parse()
        .map_err(|_| ConfigError::NotANumber(s.to_string()))?;
    if !value.is_finite() {
        return Err(ConfigError::NotANumber(s.to_string()));
    }
    if value < 0.0 {
        return Err(ConfigError::Negative(s.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("1").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_seconds(" 0.5 ").unwrap(), Duration::from_millis(500));
        assert_eq!(
            parse_seconds("0"),
            Err(ConfigError::NotPositive("0".to_string()))
        );
        assert_eq!(
            parse_seconds("1e-10"),
            Err(ConfigError::NotPositive("1e-10".to_string()))
        );
        assert_eq!(
            parse_seconds("-1"),
            Err(ConfigError::Negative("-1".to_string()))
        );
        assert!(matches!(parse_seconds("abc"), Err(ConfigError::NotANumber(_))));
        assert!(matches!(parse_seconds("inf"), Err(ConfigError::NotANumber(_))));
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("0").unwrap(), 0);
        assert_eq!(parse_count("1048576").unwrap(), 1048576);
        assert_eq!(parse_count("-5"), Err(ConfigError::Negative("-5".to_string())));
        assert!(matches!(parse_count("1.5"), Err(ConfigError::NotANumber(_))));
        assert!(matches!(parse_count(""), Err(ConfigError::NotANumber(_))));
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit("10").unwrap(), 10);
        assert!(parse_limit("ten").is_err());
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("5").unwrap(), 5.0);
        assert_eq!(parse_percent("0.25").unwrap(), 0.25);
        assert!(matches!(parse_percent("-0.1"), Err(ConfigError::Negative(_))));
        assert!(matches!(parse_percent("NaN"), Err(ConfigError::NotANumber(_))));
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());

        let zero_interval = Config {
            interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(
            zero_interval.validate(),
            Err(ConfigError::NotPositive(_))
        ));

        let negative_cpu = Config {
            min_cpu_percent: -1.0,
            ..Config::default()
        };
        assert!(matches!(negative_cpu.validate(), Err(ConfigError::Negative(_))));
    }

    #[test]
    fn test_error_messages_name_the_value() {
        let err = parse_count("-3").unwrap_err();
        assert_eq!(err.to_string(), "'-3' must not be negative");
    }
}
