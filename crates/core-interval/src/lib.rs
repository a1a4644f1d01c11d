//! Interval token parsing and comparison.
//!
//! An interval token is a digit run followed by an optional single-letter
//! unit. This crate is the sole arbiter of that grammar: every other crate
//! treats `Interval` as an opaque, already-validated value produced here.

use chrono::{Datelike, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Errors raised while parsing or bucketing an interval token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntervalError {
    #[error("invalid interval token: {0:?}")]
    InvalidInterval(String),
    #[error("interval unit is tick- or range-based and has no fixed duration: {0:?}")]
    UnsupportedInterval(String),
}

/// The unit half of an interval token. Case-sensitive: `M` is months, `m`
/// (or no letter at all) is minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
    Tick,
    Range,
}

impl IntervalUnit {
    fn from_letter(c: Option<char>) -> Option<Self> {
        match c {
            None | Some('m') => Some(Self::Minute),
            Some('S') => Some(Self::Second),
            Some('H') => Some(Self::Hour),
            Some('D') => Some(Self::Day),
            Some('W') => Some(Self::Week),
            Some('M') => Some(Self::Month),
            Some('Y') => Some(Self::Year),
            Some('T') => Some(Self::Tick),
            Some('R') => Some(Self::Range),
            _ => None,
        }
    }

    fn is_calendar(self) -> bool {
        matches!(self, Self::Month | Self::Year)
    }

    fn is_resamplable(self) -> bool {
        !matches!(self, Self::Tick | Self::Range)
    }
}

/// A parsed, validated interval token: a count of units of a given kind.
///
/// `Interval` keeps the original token string so callers can redisplay it
/// without reformatting (e.g. `"60"` and `"1H"` are different tokens even if
/// they denote the same duration).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    unit: IntervalUnit,
    count: u32,
    token: String,
}

impl Interval {
    pub fn unit(&self) -> IntervalUnit {
        self.unit
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Whether the resampler can aggregate into this interval. Tick/range
    /// intervals are UI-visible but have no fixed bucket boundaries.
    pub fn is_resamplable(&self) -> bool {
        self.unit.is_resamplable()
    }

    fn is_calendar(&self) -> bool {
        self.unit.is_calendar()
    }

    /// Duration in seconds for fixed-duration units, `None` for calendar or
    /// tick/range units (which have no fixed duration).
    fn fixed_seconds(&self) -> Option<i64> {
        let per_unit: i64 = match self.unit {
            IntervalUnit::Second => 1,
            IntervalUnit::Minute => 60,
            IntervalUnit::Hour => 3_600,
            IntervalUnit::Day => 86_400,
            IntervalUnit::Week => 604_800,
            IntervalUnit::Month | IntervalUnit::Year | IntervalUnit::Tick | IntervalUnit::Range => {
                return None;
            }
        };
        Some(per_unit * i64::from(self.count))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// Parse an interval token: digits, then an optional single-letter unit.
pub fn parse(token: &str) -> Result<Interval, IntervalError> {
    if token.is_empty() {
        return Err(IntervalError::InvalidInterval(token.to_string()));
    }
    let digit_end = token
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(idx, _)| idx)
        .unwrap_or(token.len());
    if digit_end == 0 {
        return Err(IntervalError::InvalidInterval(token.to_string()));
    }
    let count: u32 = token[..digit_end]
        .parse()
        .map_err(|_| IntervalError::InvalidInterval(token.to_string()))?;
    if count == 0 {
        return Err(IntervalError::InvalidInterval(token.to_string()));
    }
    let rest = &token[digit_end..];
    let unit_char = match rest.chars().next() {
        None => None,
        Some(c) if rest.chars().count() == 1 => Some(c),
        Some(_) => return Err(IntervalError::InvalidInterval(token.to_string())),
    };
    let unit =
        IntervalUnit::from_letter(unit_char).ok_or_else(|| IntervalError::InvalidInterval(token.to_string()))?;
    Ok(Interval {
        unit,
        count,
        token: token.to_string(),
    })
}

/// Duration in milliseconds, using 30-day months and 365-day years. Only
/// valid for *ordering* — never for bucketing (see [`bucket_start`]).
pub fn to_milliseconds(token: &Interval) -> Result<i64, IntervalError> {
    if !token.unit.is_resamplable() {
        return Err(IntervalError::UnsupportedInterval(token.token.clone()));
    }
    let per_unit_seconds: i64 = match token.unit {
        IntervalUnit::Second => 1,
        IntervalUnit::Minute => 60,
        IntervalUnit::Hour => 3_600,
        IntervalUnit::Day => 86_400,
        IntervalUnit::Week => 604_800,
        IntervalUnit::Month => 86_400 * 30,
        IntervalUnit::Year => 86_400 * 365,
        IntervalUnit::Tick | IntervalUnit::Range => unreachable!("filtered above"),
    };
    Ok(per_unit_seconds * i64::from(token.count) * 1_000)
}

/// Total order over intervals by nominal duration. Tick/range intervals
/// order after all fixed/calendar intervals (they have no duration) and
/// compare equal to each other only when the unit matches.
pub fn compare(a: &Interval, b: &Interval) -> Ordering {
    match (to_milliseconds(a), to_milliseconds(b)) {
        (Ok(ma), Ok(mb)) => ma.cmp(&mb),
        (Err(_), Err(_)) => (a.unit as u8, a.count).cmp(&(b.unit as u8, b.count)),
        (Err(_), Ok(_)) => Ordering::Greater,
        (Ok(_), Err(_)) => Ordering::Less,
    }
}

/// Whether `a` is strictly finer (shorter duration) than `b`.
pub fn is_finer_than(a: &Interval, b: &Interval) -> bool {
    compare(a, b) == Ordering::Less
}

/// The minimum of a non-empty set under [`compare`].
pub fn finest_of<'a, I>(intervals: I) -> Option<&'a Interval>
where
    I: IntoIterator<Item = &'a Interval>,
{
    intervals.into_iter().min_by(|a, b| compare(a, b))
}

/// Start of the bucket (seconds since epoch, UTC) containing `time` for the
/// given interval. Fixed-duration intervals use plain arithmetic; calendar
/// intervals (months, years) use broken-down UTC time; weeks anchor to
/// Monday 00:00 UTC.
pub fn bucket_start(time: i64, interval: &Interval) -> Result<i64, IntervalError> {
    if !interval.unit.is_resamplable() {
        return Err(IntervalError::UnsupportedInterval(interval.token.clone()));
    }
    if interval.is_calendar() {
        return calendar_bucket_start(time, interval);
    }
    if interval.unit == IntervalUnit::Week {
        return Ok(week_bucket_start(time));
    }
    let seconds = interval
        .fixed_seconds()
        .expect("non-calendar, non-week interval always has a fixed duration");
    Ok(time.div_euclid(seconds) * seconds)
}

/// ISO week: Monday 00:00 UTC is the anchor, independent of `count` (a
/// multi-week interval like `2W` still anchors each bucket to a Monday;
/// grouping multiple weeks together is not defined by the spec and is not
/// attempted here).
fn week_bucket_start(time: i64) -> i64 {
    const EPOCH_WEEKDAY_MONDAY_OFFSET: i64 = 4; // 1970-01-01 was a Thursday
    let days = time.div_euclid(86_400);
    let day_start = days * 86_400;
    let weekday = (days + EPOCH_WEEKDAY_MONDAY_OFFSET).rem_euclid(7);
    day_start - weekday * 86_400
}

fn calendar_bucket_start(time: i64, interval: &Interval) -> Result<i64, IntervalError> {
    let dt = Utc.timestamp_opt(time, 0).single().ok_or_else(|| {
        IntervalError::InvalidInterval(format!("out-of-range timestamp {time}"))
    })?;
    let start = match interval.unit {
        IntervalUnit::Month => {
            let group = interval.count.max(1);
            let month0 = dt.month0(); // 0-based
            let bucket_month0 = (month0 / group) * group;
            Utc.with_ymd_and_hms(dt.year(), bucket_month0 + 1, 1, 0, 0, 0)
                .single()
        }
        IntervalUnit::Year => Utc.with_ymd_and_hms(dt.year(), 1, 1, 0, 0, 0).single(),
        _ => unreachable!("calendar bucketing only applies to months/years"),
    };
    start
        .map(|d| d.timestamp())
        .ok_or_else(|| IntervalError::InvalidInterval(interval.token.clone()))
}
