//! Timestamp rendering for log lines
//!
//! Records carry a monotonic [`Instant`]. A [`ClockOrigin`] captured once at
//! pipeline start maps those instants to wall-clock time (absolute column)
//! and to time elapsed since start (startup column).

use super::error::{LoggerError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, NaiveTime, TimeDelta, Utc};
use std::fmt::{self, Write};
use std::time::{Duration, Instant};

const NANOS_PER_DAY: u128 = 24 * 60 * 60 * 1_000_000_000;

/// Default absolute time pattern: `13:45:07.123456`
pub const DEFAULT_ABSOLUTE_TIME_FORMAT: &str = "%H:%M:%S%.6f";

/// Default startup time pattern, applied to the elapsed time as if it were a
/// time of day: `00:02:13.000451`
pub const DEFAULT_STARTUP_TIME_FORMAT: &str = "%H:%M:%S%.6f";

/// Reference point pairing a monotonic instant with the wall clock.
#[derive(Debug, Clone, Copy)]
pub struct ClockOrigin {
    instant: Instant,
    wall: DateTime<Utc>,
}

impl ClockOrigin {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: Utc::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.wall
    }

    /// Wall-clock time of `at`. Instants before the origin map to the origin.
    pub fn wall_time(&self, at: Instant) -> DateTime<Utc> {
        let offset = at.saturating_duration_since(self.instant);
        self.wall + TimeDelta::from_std(offset).unwrap_or_else(|_| TimeDelta::zero())
    }

    pub fn elapsed(&self, at: Instant) -> Duration {
        at.saturating_duration_since(self.instant)
    }

    pub fn uptime(&self) -> Duration {
        self.instant.elapsed()
    }
}

/// Reject strftime patterns chrono cannot render.
pub fn validate_pattern(component: &str, pattern: &str) -> Result<()> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(LoggerError::config(
            component,
            format!("invalid time format '{}'", pattern),
        ));
    }
    Ok(())
}

fn trial_render(
    component: &str,
    pattern: &str,
    render: impl FnOnce(&mut String) -> fmt::Result,
) -> Result<()> {
    let mut out = String::new();
    render(&mut out).map_err(|_| {
        LoggerError::config(
            component,
            format!("time format '{}' names fields that cannot be rendered", pattern),
        )
    })
}

/// Absolute time column, local or UTC.
#[derive(Debug, Clone)]
pub struct AbsoluteTime {
    pattern: String,
    utc: bool,
}

impl AbsoluteTime {
    /// # Errors
    ///
    /// Returns error if `pattern` does not parse or names a field a date
    /// and time cannot render
    pub fn new(pattern: impl Into<String>, utc: bool) -> Result<Self> {
        let pattern = pattern.into();
        validate_pattern("absolute_time_format", &pattern)?;
        let column = Self { pattern, utc };
        trial_render("absolute_time_format", &column.pattern, |out| {
            column.write(out, DateTime::<Utc>::default())
        })?;
        Ok(column)
    }

    pub fn write(&self, out: &mut String, at: DateTime<Utc>) -> fmt::Result {
        if self.utc {
            write!(out, "{}", at.format(&self.pattern))
        } else {
            write!(out, "{}", at.with_timezone(&Local).format(&self.pattern))
        }
    }
}

/// Time elapsed since pipeline start.
///
/// The elapsed duration is rendered as a time of day, so the hour field wraps
/// after 24 hours.
#[derive(Debug, Clone)]
pub struct StartupTime {
    pattern: String,
}

impl StartupTime {
    /// # Errors
    ///
    /// Returns error if `pattern` does not parse or names a field a time of
    /// day cannot render, such as the year
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        validate_pattern("startup_time_format", &pattern)?;
        let column = Self { pattern };
        trial_render("startup_time_format", &column.pattern, |out| {
            column.write(out, Duration::ZERO)
        })?;
        Ok(column)
    }

    pub fn write(&self, out: &mut String, elapsed: Duration) -> fmt::Result {
        write!(out, "{}", elapsed_as_time_of_day(elapsed).format(&self.pattern))
    }
}

fn elapsed_as_time_of_day(elapsed: Duration) -> NaiveTime {
    let nanos = (elapsed.as_nanos() % NANOS_PER_DAY) as i64;
    NaiveTime::default() + TimeDelta::nanoseconds(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_datetime() -> DateTime<Utc> {
        // 2025-01-08 10:30:45.123456 UTC
        Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45)
            .single()
            .expect("valid datetime")
            + TimeDelta::microseconds(123456)
    }

    #[test]
    fn test_absolute_utc() {
        let column = AbsoluteTime::new(DEFAULT_ABSOLUTE_TIME_FORMAT, true).unwrap();
        let mut out = String::new();
        column.write(&mut out, fixed_datetime()).unwrap();
        assert_eq!(out, "10:30:45.123456");
    }

    #[test]
    fn test_absolute_custom_pattern() {
        let column = AbsoluteTime::new("%Y/%m/%d %H:%M", true).unwrap();
        let mut out = String::new();
        column.write(&mut out, fixed_datetime()).unwrap();
        assert_eq!(out, "2025/01/08 10:30");
    }

    #[test]
    fn test_absolute_local_matches_chrono_local() {
        let column = AbsoluteTime::new("%Y-%m-%d %H:%M:%S", false).unwrap();
        let mut out = String::new();
        column.write(&mut out, fixed_datetime()).unwrap();
        let expected = fixed_datetime().with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_startup_time() {
        let column = StartupTime::new(DEFAULT_STARTUP_TIME_FORMAT).unwrap();
        let mut out = String::new();
        column
            .write(&mut out, Duration::from_secs(3 * 3600 + 62) + Duration::from_micros(451))
            .unwrap();
        assert_eq!(out, "03:01:02.000451");
    }

    #[test]
    fn test_startup_time_wraps_after_a_day() {
        let column = StartupTime::new("%H:%M:%S").unwrap();
        let mut out = String::new();
        column.write(&mut out, Duration::from_secs(25 * 3600)).unwrap();
        assert_eq!(out, "01:00:00");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(AbsoluteTime::new("%Q", true).is_err());
        assert!(StartupTime::new("%").is_err());
    }

    #[test]
    fn test_date_fields_rejected_for_startup_time() {
        let err = StartupTime::new("%Y-%m-%d %H:%M").unwrap_err();
        assert!(matches!(err, LoggerError::InvalidConfiguration { .. }));
        assert!(StartupTime::new("%H:%M:%S%.3f").is_ok());
    }

    #[test]
    fn test_offset_field_needs_a_date() {
        assert!(AbsoluteTime::new("%Y-%m-%d %H:%M %z", true).is_ok());
        assert!(AbsoluteTime::new("%Y-%m-%d %H:%M %z", false).is_ok());
        assert!(StartupTime::new("%H %z").is_err());
    }

    #[test]
    fn test_origin_maps_instants() {
        let origin = ClockOrigin::now();
        let later = Instant::now() + Duration::from_millis(1500);
        let wall = origin.wall_time(later);
        let elapsed = origin.elapsed(later);
        assert!(elapsed >= Duration::from_millis(1500));
        assert_eq!(wall - origin.started_at(), TimeDelta::from_std(elapsed).unwrap());
    }
}
