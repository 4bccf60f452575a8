//! Calendar values as the server represents them.
//!
//! MySQL dates are not restricted to valid calendar dates: `0000-00-00` and
//! partial zero dates are legal column values, and TIME spans roughly
//! ±838 hours. These types keep the wire fields as-is so that values survive
//! a decode/encode cycle unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

const MICROS_PER_SECOND: i64 = 1_000_000;
const SECONDS_PER_DAY: i64 = 86_400;

/// A DATE value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

/// A TIME value: a signed duration split into days and clock fields.
///
/// Hours beyond 23 are carried in `days`, the way the binary protocol sends
/// them. `Display` prints total hours again, so `"25:00:00"` parses to one day
/// and one hour and displays as `"25:00:00"`. Zero is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Time {
    pub negative: bool,
    pub days: u32,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub microseconds: u32,
}

/// A DATETIME or TIMESTAMP value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
}

impl Date {
    /// The `0000-00-00` zero date.
    pub const ZERO: Date = Date {
        year: 0,
        month: 0,
        day: 0,
    };

    pub const fn new(year: u16, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }

    pub const fn is_zero(&self) -> bool {
        self.year == 0 && self.month == 0 && self.day == 0
    }

    /// Convert from days since 1970-01-01.
    ///
    /// Years outside `0..=65535` saturate.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_days_since_epoch(days: i32) -> Self {
        let (y, m, d) = civil_from_days(i64::from(days));
        Self {
            year: y.clamp(0, i64::from(u16::MAX)) as u16,
            month: m as u8,
            day: d as u8,
        }
    }

    /// Days since 1970-01-01, or `None` for zero and out-of-range dates.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_days_since_epoch(&self) -> Option<i32> {
        if !(1..=12).contains(&self.month) || self.day == 0 || self.day > 31 {
            return None;
        }
        let days = days_from_civil(
            i64::from(self.year),
            i64::from(self.month),
            i64::from(self.day),
        );
        i32::try_from(days).ok()
    }

    /// Parse `YYYY-MM-DD`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '-');
        let year = parts.next()?.parse().ok()?;
        let month = parts.next()?.parse().ok()?;
        let day = parts.next()?.parse().ok()?;
        Some(Self { year, month, day })
    }
}

impl Time {
    pub const ZERO: Time = Time {
        negative: false,
        days: 0,
        hours: 0,
        minutes: 0,
        seconds: 0,
        microseconds: 0,
    };

    pub const fn is_zero(&self) -> bool {
        self.days == 0
            && self.hours == 0
            && self.minutes == 0
            && self.seconds == 0
            && self.microseconds == 0
    }

    /// Build a time from a signed microsecond count.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_micros(micros: i64) -> Self {
        let negative = micros < 0;
        let abs = micros.unsigned_abs();
        let micros_per_second = MICROS_PER_SECOND as u64;
        let total_seconds = abs / micros_per_second;
        Self {
            negative,
            days: (total_seconds / SECONDS_PER_DAY as u64) as u32,
            hours: ((total_seconds % SECONDS_PER_DAY as u64) / 3600) as u8,
            minutes: ((total_seconds % 3600) / 60) as u8,
            seconds: (total_seconds % 60) as u8,
            microseconds: (abs % micros_per_second) as u32,
        }
    }

    /// Signed microsecond count.
    pub fn to_micros(&self) -> i64 {
        let seconds = i64::from(self.days) * SECONDS_PER_DAY
            + i64::from(self.hours) * 3600
            + i64::from(self.minutes) * 60
            + i64::from(self.seconds);
        let total = seconds * MICROS_PER_SECOND + i64::from(self.microseconds);
        if self.negative { -total } else { total }
    }

    /// Parse `[-]H+:MM:SS[.ffffff]`, where hours may exceed 24.
    #[allow(clippy::cast_possible_truncation)]
    pub fn parse(s: &str) -> Option<Self> {
        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (clock, fraction) = match rest.split_once('.') {
            Some((clock, fraction)) => (clock, Some(fraction)),
            None => (rest, None),
        };
        let mut parts = clock.splitn(3, ':');
        let total_hours: u32 = parts.next()?.parse().ok()?;
        let minutes = parts.next()?.parse().ok()?;
        let seconds = parts.next()?.parse().ok()?;
        let microseconds = match fraction {
            Some(f) => parse_fraction(f)?,
            None => 0,
        };
        let mut time = Self {
            negative,
            days: total_hours / 24,
            hours: (total_hours % 24) as u8,
            minutes,
            seconds,
            microseconds,
        };
        // "-00:00:00" is zero; the binary form has no signed zero
        time.negative = negative && !time.is_zero();
        Some(time)
    }
}

impl DateTime {
    pub const ZERO: DateTime = DateTime {
        year: 0,
        month: 0,
        day: 0,
        hour: 0,
        minute: 0,
        second: 0,
        microsecond: 0,
    };

    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            microsecond: 0,
        }
    }

    pub const fn with_microsecond(mut self, microsecond: u32) -> Self {
        self.microsecond = microsecond;
        self
    }

    pub const fn date(&self) -> Date {
        Date {
            year: self.year,
            month: self.month,
            day: self.day,
        }
    }

    pub const fn has_time(&self) -> bool {
        self.hour != 0 || self.minute != 0 || self.second != 0 || self.microsecond != 0
    }

    /// Build from microseconds since the Unix epoch (UTC).
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_unix_micros(micros: i64) -> Self {
        let days = micros.div_euclid(SECONDS_PER_DAY * MICROS_PER_SECOND);
        let rem = micros.rem_euclid(SECONDS_PER_DAY * MICROS_PER_SECOND);
        let (y, m, d) = civil_from_days(days);
        let secs = rem / MICROS_PER_SECOND;
        Self {
            year: y.clamp(0, i64::from(u16::MAX)) as u16,
            month: m as u8,
            day: d as u8,
            hour: (secs / 3600) as u8,
            minute: ((secs % 3600) / 60) as u8,
            second: (secs % 60) as u8,
            microsecond: (rem % MICROS_PER_SECOND) as u32,
        }
    }

    /// Microseconds since the Unix epoch, or `None` for zero dates.
    pub fn to_unix_micros(&self) -> Option<i64> {
        let days = i64::from(self.date().to_days_since_epoch()?);
        let secs = days * SECONDS_PER_DAY
            + i64::from(self.hour) * 3600
            + i64::from(self.minute) * 60
            + i64::from(self.second);
        Some(secs * MICROS_PER_SECOND + i64::from(self.microsecond))
    }

    /// Parse `YYYY-MM-DD[ HH:MM:SS[.ffffff]]`.
    pub fn parse(s: &str) -> Option<Self> {
        let (date, time) = match s.split_once(|c| c == ' ' || c == 'T') {
            Some((date, time)) => (date, Some(time)),
            None => (s, None),
        };
        let date = Date::parse(date)?;
        let mut dt = Self {
            year: date.year,
            month: date.month,
            day: date.day,
            ..Self::ZERO
        };
        if let Some(time) = time {
            let (clock, fraction) = match time.split_once('.') {
                Some((clock, fraction)) => (clock, Some(fraction)),
                None => (time, None),
            };
            let mut parts = clock.splitn(3, ':');
            dt.hour = parts.next()?.parse().ok()?;
            dt.minute = parts.next()?.parse().ok()?;
            dt.second = parts.next()?.parse().ok()?;
            if let Some(f) = fraction {
                dt.microsecond = parse_fraction(f)?;
            }
        }
        Some(dt)
    }
}

impl From<Date> for DateTime {
    fn from(date: Date) -> Self {
        Self {
            year: date.year,
            month: date.month,
            day: date.day,
            ..Self::ZERO
        }
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        let hours = self.days * 24 + u32::from(self.hours);
        write!(f, "{:02}:{:02}:{:02}", hours, self.minutes, self.seconds)?;
        if self.microseconds != 0 {
            write!(f, ".{:06}", self.microseconds)?;
        }
        Ok(())
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;
        if self.microsecond != 0 {
            write!(f, ".{:06}", self.microsecond)?;
        }
        Ok(())
    }
}

/// Parse up to six fractional-second digits into microseconds.
fn parse_fraction(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits: u32 = s.parse().ok()?;
    Some(digits * 10u32.pow(6 - s.len() as u32))
}

/// Civil date from days since 1970-01-01 (Howard Hinnant's algorithm).
fn civil_from_days(days: i64) -> (i64, i64, i64) {
    // Shift epoch to 0000-03-01 so leap days fall at the end of the year
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Days since 1970-01-01 from a civil date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_conversion() {
        assert_eq!(Date::from_days_since_epoch(0), Date::new(1970, 1, 1));
        assert_eq!(Date::from_days_since_epoch(19_782), Date::new(2024, 2, 29));
        assert_eq!(Date::from_days_since_epoch(-1), Date::new(1969, 12, 31));
        assert_eq!(Date::new(2024, 2, 29).to_days_since_epoch(), Some(19_782));
        assert_eq!(Date::ZERO.to_days_since_epoch(), None);
    }

    #[test]
    fn test_date_parse_and_display() {
        let d = Date::parse("2024-01-15").unwrap();
        assert_eq!(d, Date::new(2024, 1, 15));
        assert_eq!(d.to_string(), "2024-01-15");
        assert_eq!(Date::parse("0000-00-00"), Some(Date::ZERO));
        assert!(Date::parse("2024-01").is_none());
        assert!(Date::parse("yesterday").is_none());
    }

    #[test]
    fn test_time_parse_and_display() {
        let t = Time::parse("-838:59:59").unwrap();
        assert!(t.negative);
        assert_eq!(t.days, 34);
        assert_eq!(t.hours, 22);
        assert_eq!(t.to_string(), "-838:59:59");

        let t = Time::parse("10:30:00.5").unwrap();
        assert_eq!(t.microseconds, 500_000);
        assert_eq!(t.to_string(), "10:30:00.500000");

        let t = Time::parse("25:00:00").unwrap();
        assert_eq!((t.days, t.hours), (1, 1));
        assert_eq!(t.to_string(), "25:00:00");

        assert!(Time::parse("10:30").is_none());
        assert!(Time::parse("10:30:00.1234567").is_none());
    }

    #[test]
    fn test_time_negative_zero_is_zero() {
        let t = Time::parse("-00:00:00").unwrap();
        assert!(!t.negative);
        assert_eq!(t, Time::ZERO);
        assert_eq!(t.to_string(), "00:00:00");

        let t = Time::parse("-00:00:00.000001").unwrap();
        assert!(t.negative);
    }

    #[test]
    fn test_time_micros() {
        let t = Time::from_micros(-(90_061 * 1_000_000 + 5));
        assert!(t.negative);
        assert_eq!((t.days, t.hours, t.minutes, t.seconds), (1, 1, 1, 1));
        assert_eq!(t.microseconds, 5);
        assert_eq!(t.to_micros(), -(90_061 * 1_000_000 + 5));
    }

    #[test]
    fn test_datetime_parse_and_display() {
        let dt = DateTime::parse("2024-02-29 23:59:58.000123").unwrap();
        assert_eq!(dt, DateTime::new(2024, 2, 29, 23, 59, 58).with_microsecond(123));
        assert_eq!(dt.to_string(), "2024-02-29 23:59:58.000123");

        let midnight = DateTime::parse("2024-02-29").unwrap();
        assert!(!midnight.has_time());
        assert_eq!(midnight.to_string(), "2024-02-29 00:00:00");
    }

    #[test]
    fn test_datetime_unix_micros() {
        let dt = DateTime::new(2024, 1, 1, 12, 0, 0).with_microsecond(7);
        let micros = dt.to_unix_micros().unwrap();
        assert_eq!(DateTime::from_unix_micros(micros), dt);
        assert_eq!(DateTime::from_unix_micros(-1).year, 1969);
        assert_eq!(DateTime::ZERO.to_unix_micros(), None);
    }
}
