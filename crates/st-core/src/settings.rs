//! Named runtime settings read by the engine.
//!
//! Settings live in the storage collaborator's key/value table as strings. The
//! engine only parses the handful it needs and falls back to defaults for
//! missing or unparseable values.

use serde::Serialize;
use thiserror::Error;

/// Key for the orange warning threshold, in minutes.
pub const WARN_ORANGE_KEY: &str = "warn_orange";
/// Key for the red warning threshold, in minutes.
pub const WARN_RED_KEY: &str = "warn_red";
/// Key for the logo size display option, in percent.
pub const LOGO_SIZE_KEY: &str = "logo_size_percent";

/// Invalid settings values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("warning thresholds must be positive (orange {orange}, red {red})")]
    NonPositiveThreshold { orange: i64, red: i64 },

    #[error("red warning ({red} min) must be less than orange warning ({orange} min)")]
    RedNotBelowOrange { orange: i64, red: i64 },

    #[error("logo size must be between 1 and 100 percent, got {0}")]
    LogoSizeOutOfRange(i64),
}

/// Remaining-time thresholds at which displays change colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WarnThresholds {
    pub orange_minutes: i64,
    pub red_minutes: i64,
}

impl Default for WarnThresholds {
    fn default() -> Self {
        Self {
            orange_minutes: 5,
            red_minutes: 1,
        }
    }
}

impl WarnThresholds {
    pub const fn new(orange_minutes: i64, red_minutes: i64) -> Result<Self, SettingsError> {
        if orange_minutes <= 0 || red_minutes <= 0 {
            return Err(SettingsError::NonPositiveThreshold {
                orange: orange_minutes,
                red: red_minutes,
            });
        }
        if red_minutes >= orange_minutes {
            return Err(SettingsError::RedNotBelowOrange {
                orange: orange_minutes,
                red: red_minutes,
            });
        }
        Ok(Self {
            orange_minutes,
            red_minutes,
        })
    }

    /// Builds thresholds from raw stored values, falling back to defaults.
    pub fn from_stored(orange: Option<&str>, red: Option<&str>) -> Self {
        let defaults = Self::default();
        let orange = parse_or(orange, defaults.orange_minutes);
        let red = parse_or(red, defaults.red_minutes);
        Self::new(orange, red).unwrap_or_else(|err| {
            tracing::warn!(%err, "stored warning thresholds are invalid, using defaults");
            defaults
        })
    }

    pub const fn orange_seconds(&self) -> i64 {
        self.orange_minutes * 60
    }

    pub const fn red_seconds(&self) -> i64 {
        self.red_minutes * 60
    }
}

/// Logo size as a percentage of the display width.
pub fn logo_size_percent(stored: Option<&str>) -> i64 {
    parse_or(stored, 10)
}

/// Validates a logo size before it is stored.
pub const fn validate_logo_size(percent: i64) -> Result<i64, SettingsError> {
    if percent < 1 || percent > 100 {
        return Err(SettingsError::LogoSizeOutOfRange(percent));
    }
    Ok(percent)
}

fn parse_or(value: Option<&str>, default: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_require_red_below_orange() {
        assert_eq!(
            WarnThresholds::new(1, 1),
            Err(SettingsError::RedNotBelowOrange { orange: 1, red: 1 })
        );
        assert_eq!(
            WarnThresholds::new(0, -1),
            Err(SettingsError::NonPositiveThreshold {
                orange: 0,
                red: -1
            })
        );
        assert!(WarnThresholds::new(10, 2).is_ok());
    }

    #[test]
    fn test_thresholds_from_stored_falls_back() {
        assert_eq!(
            WarnThresholds::from_stored(None, None),
            WarnThresholds::default()
        );
        assert_eq!(
            WarnThresholds::from_stored(Some("abc"), Some("2")),
            WarnThresholds::new(5, 2).unwrap()
        );
        assert_eq!(
            WarnThresholds::from_stored(Some("2"), Some("3")),
            WarnThresholds::default()
        );
    }

    #[test]
    fn test_threshold_seconds() {
        let thresholds = WarnThresholds::default();
        assert_eq!(thresholds.orange_seconds(), 300);
        assert_eq!(thresholds.red_seconds(), 60);
    }

    #[test]
    fn test_logo_size() {
        assert_eq!(logo_size_percent(None), 10);
        assert_eq!(logo_size_percent(Some("25")), 25);
        assert_eq!(validate_logo_size(0), Err(SettingsError::LogoSizeOutOfRange(0)));
        assert_eq!(validate_logo_size(100), Ok(100));
    }
}
