//! Wall-clock timestamps and a wrapping monotonic counter.
//!
//! Timestamp strings look like `YYYYMMDD-HH:MM:SS`. Either half may be
//! omitted: a missing date means today and missing time fields are zero.
//! Dates may also be written `MM/DD/YY` or `MM/DD/YYYY` (two-digit years are
//! in 2000..=2099). Time fields are always exactly two digits.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{OsError, OsResult};

const FORMAT: &str = "%Y%m%d-%H:%M:%S";

/// A local wall-clock time with one-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// The current local time, truncated to the second.
    pub fn now() -> Self {
        let now = Local::now().naive_local();
        Self(now.with_nanosecond(0).unwrap_or(now))
    }

    /// Builds a timestamp from calendar fields.
    pub fn from_parts(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> OsResult<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| invalid(format!("no such date: {year:04}-{month:02}-{day:02}")))?;
        let time = NaiveTime::from_hms_opt(hour, minute, second)
            .ok_or_else(|| invalid(format!("no such time: {hour:02}:{minute:02}:{second:02}")))?;
        Ok(Self(date.and_time(time)))
    }

    /// Local time of a Unix epoch second count.
    pub fn from_unix_seconds(secs: i64) -> OsResult<Self> {
        let utc = chrono::DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| invalid(format!("epoch seconds out of range: {secs}")))?;
        Ok(Self(utc.with_timezone(&Local).naive_local()))
    }

    /// Parses any accepted timestamp string.
    pub fn parse(s: &str) -> OsResult<Self> {
        let (date_part, time_part) = match s.split_once('-') {
            Some((date, time)) => (date, time),
            None if s.contains(':') => ("", s),
            None => (s, ""),
        };

        let date = if date_part.is_empty() {
            Local::now().date_naive()
        } else {
            parse_date(date_part)?
        };
        let time = parse_time(time_part)?;
        Ok(Self(date.and_time(time)))
    }

    /// True when [`Timestamp::parse`] would accept `s`.
    pub fn is_valid_timestamp_string(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// Calendar year.
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Month, 1-12.
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// Day of month, 1-31.
    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Hour, 0-23.
    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    /// Minute, 0-59.
    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    /// Second, 0-59.
    pub fn second(&self) -> u32 {
        self.0.second()
    }

    /// Seconds from `earlier` to `self`; negative when `earlier` is later.
    pub fn seconds_since(&self, earlier: &Timestamp) -> i64 {
        (self.0 - earlier.0).num_seconds()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = OsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn invalid(reason: String) -> OsError {
    OsError::InvalidValue { reason }
}

fn digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_date(s: &str) -> OsResult<NaiveDate> {
    let bad = || invalid(format!("invalid date: {s:?}"));

    let (year, month, day) = if s.contains('/') {
        let mut parts = s.split('/');
        let (Some(m), Some(d), Some(y), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(bad());
        };
        if m.len() != 2 || d.len() != 2 || !(y.len() == 2 || y.len() == 4) {
            return Err(bad());
        }
        let year = digits(y).ok_or_else(bad)?;
        let year = if y.len() == 2 { 2000 + year } else { year };
        (year, digits(m).ok_or_else(bad)?, digits(d).ok_or_else(bad)?)
    } else {
        if s.len() != 8 || !s.is_ascii() {
            return Err(bad());
        }
        (
            digits(&s[0..4]).ok_or_else(bad)?,
            digits(&s[4..6]).ok_or_else(bad)?,
            digits(&s[6..8]).ok_or_else(bad)?,
        )
    };

    let year = i32::try_from(year).map_err(|_| bad())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(bad)
}

fn parse_time(s: &str) -> OsResult<NaiveTime> {
    let bad = || invalid(format!("invalid time: {s:?}"));

    if s.is_empty() {
        return Ok(NaiveTime::MIN);
    }

    let mut fields = [0u32; 3];
    let mut count = 0;
    for part in s.split(':') {
        if count == fields.len() || part.len() != 2 {
            return Err(bad());
        }
        fields[count] = digits(part).ok_or_else(bad)?;
        count += 1;
    }

    let [hour, minute, second] = fields;
    if hour > 23 || minute > 59 || second > 59 {
        return Err(bad());
    }
    NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(bad)
}

fn process_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Monotonic millisecond counter for measuring elapsed time.
///
/// The counter is 32 bits wide and wraps about every 49.7 days; deltas are
/// computed modulo 2^32, so an interval shorter than the wrap period is
/// always measured correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelativeTime(u32);

impl RelativeTime {
    /// The current counter value.
    pub fn now() -> Self {
        // Truncation is the wrap.
        Self(process_epoch().elapsed().as_millis() as u32)
    }

    /// A counter value taken from elsewhere, e.g. a peer.
    pub fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    /// Raw counter value.
    pub fn millis(self) -> u32 {
        self.0
    }

    /// Milliseconds from `earlier` to `self`.
    pub fn millis_since(self, earlier: RelativeTime) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Milliseconds elapsed since `self`.
    pub fn elapsed(self) -> u32 {
        RelativeTime::now().millis_since(self)
    }
}
