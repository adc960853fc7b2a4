//! Epoch timestamps and textual time parsing
//!
//! All range arithmetic works on `Epoch`, a nanosecond count since the Unix
//! epoch. A zero `Epoch` doubles as the "unbounded / unknown" marker that the
//! counting and splicing operations skip.
//!
//! Steps, splice widths and tolerances are `chrono::Duration` values. They are
//! signed on purpose: zero and negative inputs are legal and are absorbed as
//! pass-through by the algebra.

use crate::timeseries::error::{TimeseriesError, TimeseriesResult};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::sync::OnceLock;

const NANOS_PER_SEC: i64 = 1_000_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;

/// Nanoseconds since 1970-01-01T00:00:00Z
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Epoch(i64);

impl Epoch {
    /// The zero value, treated as "unbounded / unknown"
    pub const ZERO: Epoch = Epoch(0);
    /// Earliest representable instant
    pub const MIN: Epoch = Epoch(i64::MIN);
    /// Latest representable instant
    pub const MAX: Epoch = Epoch(i64::MAX);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(NANOS_PER_MILLI))
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(NANOS_PER_SEC))
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_nanos_opt().unwrap_or(if dt.timestamp() < 0 {
            i64::MIN
        } else {
            i64::MAX
        }))
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Current wall-clock time truncated to the second (recency stamps)
    pub fn now_truncated() -> Self {
        Self::now().truncate(Duration::seconds(1))
    }

    pub const fn nanos(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn unix_secs(self) -> i64 {
        self.0.div_euclid(NANOS_PER_SEC)
    }

    pub fn unix_millis(self) -> i64 {
        self.0.div_euclid(NANOS_PER_MILLI)
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.0)
    }

    /// Round down to a multiple of `step`, measured from the Unix epoch.
    ///
    /// A zero or negative step returns the timestamp unchanged.
    pub fn truncate(self, step: Duration) -> Self {
        let step = duration_nanos(step);
        if step <= 0 {
            return self;
        }
        Self(self.0 - self.0.rem_euclid(step))
    }
}

impl Add<Duration> for Epoch {
    type Output = Epoch;

    fn add(self, rhs: Duration) -> Epoch {
        Epoch(self.0.saturating_add(duration_nanos(rhs)))
    }
}

impl Sub<Duration> for Epoch {
    type Output = Epoch;

    fn sub(self, rhs: Duration) -> Epoch {
        Epoch(self.0.saturating_sub(duration_nanos(rhs)))
    }
}

impl Sub<Epoch> for Epoch {
    type Output = Duration;

    fn sub(self, rhs: Epoch) -> Duration {
        Duration::nanoseconds(self.0.saturating_sub(rhs.0))
    }
}

impl From<DateTime<Utc>> for Epoch {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

/// Nanosecond length of a duration, saturating at the `i64` bounds
pub fn duration_nanos(d: Duration) -> i64 {
    d.num_nanoseconds()
        .unwrap_or(if d < Duration::zero() { i64::MIN } else { i64::MAX })
}

/// Which textual form `parse_epoch` recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochFormat {
    /// 10-digit epoch seconds: `1577836800`
    UnixSeconds,
    /// 13-digit epoch milliseconds: `1577836800000`
    UnixMillis,
    /// SQL datetime: `2020-01-01 00:00:00`
    SqlDateTime,
    /// SQL date: `2020-01-01`
    SqlDate,
}

/// Parse a textual timestamp into an `Epoch`.
///
/// Accepted forms are 10-digit epoch seconds, 13-digit epoch milliseconds,
/// `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD` (both UTC).
pub fn parse_epoch(input: &str) -> TimeseriesResult<(Epoch, EpochFormat)> {
    let invalid = || TimeseriesError::InvalidTimeFormat(input.to_string());
    let len = input.len();

    if len > 0 && input.bytes().all(|b| b.is_ascii_digit()) {
        let value: i64 = input.parse().map_err(|_| invalid())?;
        match len {
            10 => return Ok((Epoch::from_secs(value), EpochFormat::UnixSeconds)),
            13 => return Ok((Epoch::from_millis(value), EpochFormat::UnixMillis)),
            _ => {}
        }
    }

    if !input.is_ascii() || (len != 10 && len != 19) {
        return Err(invalid());
    }
    let bytes = input.as_bytes();
    if bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(invalid());
    }

    let field = |range: std::ops::Range<usize>| -> TimeseriesResult<u32> {
        input[range].parse::<u32>().map_err(|_| invalid())
    };
    let year = input[0..4].parse::<i32>().map_err(|_| invalid())?;
    let month = field(5..7)?;
    let day = field(8..10)?;
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;

    let (hour, minute, second, format) = if len == 19 {
        if bytes[10] != b' ' || bytes[13] != b':' || bytes[16] != b':' {
            return Err(invalid());
        }
        (
            field(11..13)?,
            field(14..16)?,
            field(17..19)?,
            EpochFormat::SqlDateTime,
        )
    } else {
        (0, 0, 0, EpochFormat::SqlDate)
    };

    let naive = date
        .and_hms_opt(hour, minute, second)
        .ok_or_else(invalid)?;
    Ok((Epoch::from_datetime(Utc.from_utc_datetime(&naive)), format))
}

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+)(ns|us|ms|s|m|h|d|w)?$").expect("duration pattern is valid")
    })
}

/// Parse a duration such as `30s`, `5m`, `1h`, `500ms` or a bare number of seconds
pub fn parse_duration(input: &str) -> TimeseriesResult<Duration> {
    let input = input.trim();
    let caps = duration_regex()
        .captures(input)
        .ok_or_else(|| TimeseriesError::InvalidDuration(input.to_string()))?;

    let amount: i64 = caps[1]
        .parse()
        .map_err(|_| TimeseriesError::InvalidDuration(input.to_string()))?;

    let unit_nanos: i64 = match caps.get(2).map(|m| m.as_str()) {
        Some("ns") => 1,
        Some("us") => 1_000,
        Some("ms") => NANOS_PER_MILLI,
        None | Some("s") => NANOS_PER_SEC,
        Some("m") => 60 * NANOS_PER_SEC,
        Some("h") => 3_600 * NANOS_PER_SEC,
        Some("d") => 86_400 * NANOS_PER_SEC,
        Some("w") => 7 * 86_400 * NANOS_PER_SEC,
        Some(other) => return Err(TimeseriesError::InvalidDuration(other.to_string())),
    };

    amount
        .checked_mul(unit_nanos)
        .map(Duration::nanoseconds)
        .ok_or_else(|| TimeseriesError::InvalidDuration(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        let t = Epoch::from_secs(3_725);
        assert_eq!(t.truncate(Duration::seconds(60)), Epoch::from_secs(3_720));
        assert_eq!(t.truncate(Duration::hours(1)), Epoch::from_secs(3_600));
        assert_eq!(t.truncate(Duration::zero()), t);
        assert_eq!(t.truncate(Duration::seconds(-60)), t);

        // pre-epoch values still round toward negative infinity
        let t = Epoch::from_secs(-30);
        assert_eq!(t.truncate(Duration::seconds(60)), Epoch::from_secs(-60));
    }

    #[test]
    fn test_arithmetic() {
        let t = Epoch::from_secs(100);
        assert_eq!(t + Duration::seconds(60), Epoch::from_secs(160));
        assert_eq!(t - Duration::seconds(60), Epoch::from_secs(40));
        assert_eq!(Epoch::from_secs(160) - t, Duration::seconds(60));
        assert_eq!(Epoch::MAX + Duration::seconds(1), Epoch::MAX);
    }

    #[test]
    fn test_parse_epoch_numeric() {
        let (ts, format) = parse_epoch("1577836800").unwrap();
        assert_eq!(ts, Epoch::from_secs(1_577_836_800));
        assert_eq!(format, EpochFormat::UnixSeconds);

        let (ts, format) = parse_epoch("1577836800000").unwrap();
        assert_eq!(ts, Epoch::from_secs(1_577_836_800));
        assert_eq!(format, EpochFormat::UnixMillis);
    }

    #[test]
    fn test_parse_epoch_sql() {
        let (ts, format) = parse_epoch("2020-01-01 00:00:00").unwrap();
        assert_eq!(ts, Epoch::from_secs(1_577_836_800));
        assert_eq!(format, EpochFormat::SqlDateTime);

        let (ts, format) = parse_epoch("2020-01-01").unwrap();
        assert_eq!(ts, Epoch::from_secs(1_577_836_800));
        assert_eq!(format, EpochFormat::SqlDate);

        let (ts, _) = parse_epoch("2020-01-01 01:02:03").unwrap();
        assert_eq!(ts, Epoch::from_secs(1_577_836_800 + 3_723));
    }

    #[test]
    fn test_parse_epoch_invalid() {
        assert!(parse_epoch("").is_err());
        assert!(parse_epoch("12345").is_err());
        assert!(parse_epoch("2020/01/01").is_err());
        assert!(parse_epoch("2020-13-01").is_err());
        assert!(parse_epoch("2020-01-01T00:00:00").is_err());
        assert!(matches!(
            parse_epoch("now"),
            Err(TimeseriesError::InvalidTimeFormat(_))
        ));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::minutes(5));
        assert_eq!(parse_duration("1h").unwrap(), Duration::hours(1));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::milliseconds(250));
        assert_eq!(parse_duration("2d").unwrap(), Duration::days(2));
        assert_eq!(parse_duration("90").unwrap(), Duration::seconds(90));
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("5 parsecs").is_err());
    }

    #[test]
    fn test_unix_conversions() {
        let t = Epoch::from_millis(1_500);
        assert_eq!(t.unix_secs(), 1);
        assert_eq!(t.unix_millis(), 1_500);
        assert!(Epoch::ZERO.is_zero());
        assert_eq!(Epoch::from_secs(0).to_datetime().timestamp(), 0);
    }
}
