//! Calendar arithmetic over epoch seconds.
//!
//! All in-memory instants are `i64` seconds since the Unix epoch. Local
//! wall-clock values use the same representation (seconds as if the local
//! clock were UTC), so the same helpers serve both. Day/month/year
//! decomposition goes through `chrono`'s naive types; no process locale or
//! platform timezone database is consulted.
//!
//! The wire format counts whole minutes since 1601-01-01 00:00. The map
//! between the two units is affine and its two directions are exact inverses
//! on whole minutes.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime};

use crate::error::{RecurrenceError, Result};

pub const SECS_PER_MINUTE: i64 = 60;
pub const SECS_PER_DAY: i64 = 86_400;
pub const MINUTES_PER_DAY: u32 = 1_440;

/// Minutes between 1601-01-01 and 1970-01-01.
pub const PATTERN_EPOCH_OFFSET_MINUTES: i64 = 194_074_560;

/// End date written for patterns that never end: 4500-12-31 23:59.
pub const NO_END_PATTERN_MINUTES: u32 = 0x5AE9_80DF;

/// Ceiling of the 32-bit pattern unit (year 9771). Date arithmetic that
/// would exceed it clamps here.
pub const MAX_PATTERN_MINUTES: u32 = u32::MAX;

/// Cumulative minutes at the start of each month of a non-leap year, which
/// is how yearly patterns express their target month.
const MONTH_START_MINUTES: [u32; 12] = [
    0,
    31 * 1_440,
    59 * 1_440,
    90 * 1_440,
    120 * 1_440,
    151 * 1_440,
    181 * 1_440,
    212 * 1_440,
    243 * 1_440,
    273 * 1_440,
    304 * 1_440,
    334 * 1_440,
];

/// Convert wire minutes to epoch seconds.
pub fn from_pattern_minutes(minutes: u32) -> i64 {
    (i64::from(minutes) - PATTERN_EPOCH_OFFSET_MINUTES) * SECS_PER_MINUTE
}

/// Convert epoch seconds to wire minutes, or fail if the value does not fit.
pub fn to_pattern_minutes_checked(secs: i64) -> Result<u32> {
    let minutes = secs.div_euclid(SECS_PER_MINUTE) + PATTERN_EPOCH_OFFSET_MINUTES;
    u32::try_from(minutes).map_err(|_| RecurrenceError::DateOverflow(secs))
}

/// Convert epoch seconds to wire minutes, clamping to the representable range.
pub fn to_pattern_minutes(secs: i64) -> u32 {
    match to_pattern_minutes_checked(secs) {
        Ok(minutes) => minutes,
        Err(_) => {
            let clamped = if secs < 0 { 0 } else { MAX_PATTERN_MINUTES };
            tracing::warn!(secs, clamped, "date outside pattern range, clamping");
            clamped
        }
    }
}

/// The latest instant representable in the pattern unit.
pub fn max_timestamp() -> i64 {
    from_pattern_minutes(MAX_PATTERN_MINUTES)
}

/// The earliest instant representable in the pattern unit.
pub fn min_timestamp() -> i64 {
    from_pattern_minutes(0)
}

/// Clamp an instant into the pattern range.
pub fn clamp_timestamp(secs: i64) -> i64 {
    secs.clamp(min_timestamp(), max_timestamp())
}

/// Floor an instant to midnight of its day.
pub fn day_start(secs: i64) -> i64 {
    secs.div_euclid(SECS_PER_DAY) * SECS_PER_DAY
}

/// Decompose an instant into calendar fields.
pub fn naive(secs: i64) -> NaiveDateTime {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or(NaiveDateTime::MAX)
}

pub fn date_of(secs: i64) -> NaiveDate {
    naive(secs).date()
}

/// Midnight of a calendar date as epoch seconds.
pub fn timestamp_of(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

/// Weekday of an instant, 0 = Sunday through 6 = Saturday.
pub fn weekday_index(secs: i64) -> u32 {
    date_of(secs).weekday().num_days_from_sunday()
}

/// Whether `mask` (bit 0 = Sunday) selects the weekday of `secs`.
pub fn weekday_selected(mask: u8, secs: i64) -> bool {
    mask & (1 << weekday_index(secs)) != 0
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the year containing `date`.
pub fn year_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

/// Advance a date by whole months; `None` once past chrono's range.
pub fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

/// Day `day` of the given month, capped to the month's last day.
pub fn capped_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = days_in_month(year, month);
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last.max(1)))
}

/// Target month (1-12) for a yearly pattern's minutes-since-year-start.
pub fn month_from_year_offset(minutes: u32) -> u32 {
    MONTH_START_MINUTES
        .iter()
        .rposition(|&start| minutes >= start)
        .map_or(1, |idx| idx as u32 + 1)
}

/// Minutes-since-year-start of the first day of `month` (1-12).
pub fn year_offset_of_month(month: u32) -> u32 {
    MONTH_START_MINUTES[(month.clamp(1, 12) - 1) as usize]
}

/// Months elapsed between 1601-01 and the month of `date`.
pub fn months_since_pattern_epoch(date: NaiveDate) -> i64 {
    (i64::from(date.year()) - 1601) * 12 + i64::from(date.month0())
}

/// Minutes from 1601-01-01 to the first day of the `months`-th month after it.
pub fn pattern_minutes_of_month_index(months: u32) -> u32 {
    let year = 1601 + (months / 12) as i32;
    let month = months % 12 + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| to_pattern_minutes(timestamp_of(d)))
        .unwrap_or(0)
}
