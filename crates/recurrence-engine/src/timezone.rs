//! Daylight-saving rule carried next to a recurrence pattern.
//!
//! The rule is data-driven from its 48-byte blob; the platform timezone
//! database is never consulted. Offsets are bias-style minutes: UTC equals
//! local time plus the offset, so zones west of Greenwich have positive
//! offsets and the DST offset is usually negative.
//!
//! Transition dates follow a "week N of month M" rule in which a week is a
//! whole 7-day block counted from the 1st, whatever its weekday. Week 5 is
//! the last such block that still starts inside the month.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::error::{RecurrenceError, Result};
use crate::time;
use crate::wire::{ByteReader, ByteWriter};

/// Size of the timezone blob.
pub const TIMEZONE_BLOB_LEN: usize = 48;

/// When DST starts or ends within a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DstTransition {
    /// 1-12; 0 disables DST for the rule.
    pub month: u16,
    /// 1-5, 5 = last.
    pub week: u16,
    pub hour: u16,
}

impl DstTransition {
    pub fn new(month: u16, week: u16, hour: u16) -> Self {
        Self { month, week, hour }
    }

    /// Local instant of this transition in `year`.
    fn local_instant(&self, year: i32) -> i64 {
        let month = u32::from(self.month.clamp(1, 12));
        let week = u32::from(self.week.clamp(1, 5));
        let mut day = 1 + (week - 1) * 7;
        if day > time::days_in_month(year, month) {
            day -= 7;
        }
        let date = chrono::NaiveDate::from_ymd_opt(year, month, day)
            .map(time::timestamp_of)
            .unwrap_or_default();
        date + i64::from(self.hour) * 3_600
    }
}

/// UTC offset rule with an optional yearly DST window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimezoneRule {
    pub base_offset_minutes: i32,
    pub dst_offset_minutes: i32,
    pub dst_start: DstTransition,
    pub dst_end: DstTransition,
}

impl TimezoneRule {
    /// UTC with no DST.
    pub fn utc() -> Self {
        Self::default()
    }

    /// A fixed offset with no DST.
    pub fn fixed(base_offset_minutes: i32) -> Self {
        Self {
            base_offset_minutes,
            ..Self::default()
        }
    }

    pub fn with_dst(
        base_offset_minutes: i32,
        dst_offset_minutes: i32,
        dst_start: DstTransition,
        dst_end: DstTransition,
    ) -> Self {
        Self {
            base_offset_minutes,
            dst_offset_minutes,
            dst_start,
            dst_end,
        }
    }

    pub fn has_dst(&self) -> bool {
        (1..=12).contains(&self.dst_start.month) && (1..=12).contains(&self.dst_end.month)
    }

    /// Bias in minutes in effect at `local` (seconds).
    ///
    /// The DST window is computed for the calendar year of `local`. When the
    /// start precedes the end the window is `start < t < end`; otherwise it
    /// wraps the year end and is `t < end || t > start`. Both boundaries are
    /// exclusive, so an instant exactly on a transition gets the base offset.
    pub fn resolve_offset_minutes(&self, local: i64) -> i32 {
        if !self.has_dst() {
            return self.base_offset_minutes;
        }
        let year = time::date_of(local).year();
        let start = self.dst_start.local_instant(year);
        let end = self.dst_end.local_instant(year);
        let in_dst = if start <= end {
            local > start && local < end
        } else {
            local < end || local > start
        };
        if in_dst {
            self.base_offset_minutes + self.dst_offset_minutes
        } else {
            self.base_offset_minutes
        }
    }

    /// Local wall-clock seconds to UTC.
    ///
    /// The DST window is evaluated on the input's own calendar fields, so
    /// instants near a transition may resolve against the other side of it.
    pub fn to_utc(&self, local: i64) -> i64 {
        local.saturating_add(i64::from(self.resolve_offset_minutes(local)) * 60)
    }

    /// UTC seconds to local wall-clock, evaluated on the UTC input's fields.
    pub fn to_local(&self, utc: i64) -> i64 {
        utc.saturating_sub(i64::from(self.resolve_offset_minutes(utc)) * 60)
    }

    /// Decode the fixed-width rule blob.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < TIMEZONE_BLOB_LEN {
            return Err(RecurrenceError::InvalidTimezoneBlob(bytes.len()));
        }
        let mut r = ByteReader::new(bytes);
        let mut read = || -> std::result::Result<Self, crate::error::DecodeError> {
            let base_offset_minutes = r.read_i32("timezone bias")?;
            r.skip(4, "timezone reserved")?;
            let dst_offset_minutes = r.read_i32("timezone dst bias")?;
            r.skip(4, "timezone reserved")?;
            let end_month = r.read_u16("dst end month")?;
            r.skip(2, "dst end reserved")?;
            let end_week = r.read_u16("dst end week")?;
            let end_hour = r.read_u16("dst end hour")?;
            r.skip(10, "timezone reserved")?;
            let start_month = r.read_u16("dst start month")?;
            r.skip(2, "dst start reserved")?;
            let start_week = r.read_u16("dst start week")?;
            let start_hour = r.read_u16("dst start hour")?;
            r.skip(6, "timezone reserved")?;
            Ok(Self {
                base_offset_minutes,
                dst_offset_minutes,
                dst_start: DstTransition::new(start_month, start_week, start_hour),
                dst_end: DstTransition::new(end_month, end_week, end_hour),
            })
        };
        read().map_err(|_| RecurrenceError::InvalidTimezoneBlob(bytes.len()))
    }

    /// Encode the fixed-width rule blob; reserved fields are zero.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_i32(self.base_offset_minutes);
        w.put_i32(0);
        w.put_i32(self.dst_offset_minutes);
        w.put_i32(0);
        w.put_u16(self.dst_end.month);
        w.put_u16(0);
        w.put_u16(self.dst_end.week);
        w.put_u16(self.dst_end.hour);
        w.put_i32(0);
        w.put_i32(0);
        w.put_u16(0);
        w.put_u16(self.dst_start.month);
        w.put_u16(0);
        w.put_u16(self.dst_start.week);
        w.put_u16(self.dst_start.hour);
        w.put_i32(0);
        w.put_u16(0);
        w.into_inner()
    }
}

/// Local midnight of the day containing the UTC instant `utc`.
pub fn local_day_of(rule: &TimezoneRule, utc: i64) -> i64 {
    time::day_start(rule.to_local(utc))
}
