//! Recurrence pattern data model.
//!
//! A [`RecurrencePattern`] is produced by [`decode`](crate::decode) or built
//! by a host application for saving. Dates are local wall-clock epoch seconds
//! (see [`crate::time`]); base dates and range bounds are local midnights.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::fields;
use crate::time;

/// Weekday mask bits, bit 0 = Sunday.
pub const SUNDAY: u8 = 0x01;
pub const MONDAY: u8 = 0x02;
pub const TUESDAY: u8 = 0x04;
pub const WEDNESDAY: u8 = 0x08;
pub const THURSDAY: u8 = 0x10;
pub const FRIDAY: u8 = 0x20;
pub const SATURDAY: u8 = 0x40;
/// Monday through Friday.
pub const WORKDAYS: u8 = 0x3E;
/// The `nth_week` value meaning "last".
pub const LAST_WEEK: u8 = 5;

/// Recurrence frequency. The wire code is the low byte of a 16-bit field
/// whose high byte is 0x20.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn code(self) -> u8 {
        match self {
            Frequency::Daily => 0x0A,
            Frequency::Weekly => 0x0B,
            Frequency::Monthly => 0x0C,
            Frequency::Yearly => 0x0D,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x0A => Some(Frequency::Daily),
            0x0B => Some(Frequency::Weekly),
            0x0C => Some(Frequency::Monthly),
            0x0D => Some(Frequency::Yearly),
            _ => None,
        }
    }
}

/// Sub-layout and day-selection rule within a frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternVariant {
    Day,
    Week,
    Month,
    MonthNth,
    MonthEnd,
    HijriMonth,
    HijriMonthNth,
    HijriMonthEnd,
}

impl PatternVariant {
    pub fn code(self) -> u16 {
        match self {
            PatternVariant::Day => 0x00,
            PatternVariant::Week => 0x01,
            PatternVariant::Month => 0x02,
            PatternVariant::MonthNth => 0x03,
            PatternVariant::MonthEnd => 0x04,
            PatternVariant::HijriMonth => 0x0A,
            PatternVariant::HijriMonthNth => 0x0B,
            PatternVariant::HijriMonthEnd => 0x0C,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x00 => Some(PatternVariant::Day),
            0x01 => Some(PatternVariant::Week),
            0x02 => Some(PatternVariant::Month),
            0x03 => Some(PatternVariant::MonthNth),
            0x04 => Some(PatternVariant::MonthEnd),
            0x0A => Some(PatternVariant::HijriMonth),
            0x0B => Some(PatternVariant::HijriMonthNth),
            0x0C => Some(PatternVariant::HijriMonthEnd),
            _ => None,
        }
    }

    /// Whether this variant may appear under `frequency`.
    pub fn allowed_for(self, frequency: Frequency) -> bool {
        match frequency {
            Frequency::Daily => matches!(self, PatternVariant::Day | PatternVariant::Week),
            Frequency::Weekly => self == PatternVariant::Week,
            Frequency::Monthly | Frequency::Yearly => !matches!(
                self,
                PatternVariant::Day | PatternVariant::Week
            ),
        }
    }

    /// "Nth weekday of the month" selection (Gregorian or Hijri).
    pub fn is_nth(self) -> bool {
        matches!(self, PatternVariant::MonthNth | PatternVariant::HijriMonthNth)
    }

    /// "Last day of the month" selection (Gregorian or Hijri).
    pub fn is_month_end(self) -> bool {
        matches!(self, PatternVariant::MonthEnd | PatternVariant::HijriMonthEnd)
    }
}

/// Calendar the pattern was authored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarType {
    #[default]
    Default,
    Gregorian,
    GregorianUs,
    JapaneseEmperor,
    Taiwan,
    KoreanTangun,
    Hijri,
    Thai,
    HebrewLunar,
    GregorianMiddleEastFrench,
    GregorianArabic,
    GregorianTransliteratedEnglish,
    GregorianTransliteratedFrench,
    JapaneseLunar,
    ChineseLunar,
    Saka,
    LunarEtoChinese,
    LunarEtoKorean,
    LunarRokuyou,
    KoreanLunar,
    UmAlQura,
}

impl CalendarType {
    const TABLE: [(u16, CalendarType); 21] = [
        (0x00, CalendarType::Default),
        (0x01, CalendarType::Gregorian),
        (0x02, CalendarType::GregorianUs),
        (0x03, CalendarType::JapaneseEmperor),
        (0x04, CalendarType::Taiwan),
        (0x05, CalendarType::KoreanTangun),
        (0x06, CalendarType::Hijri),
        (0x07, CalendarType::Thai),
        (0x08, CalendarType::HebrewLunar),
        (0x09, CalendarType::GregorianMiddleEastFrench),
        (0x0A, CalendarType::GregorianArabic),
        (0x0B, CalendarType::GregorianTransliteratedEnglish),
        (0x0C, CalendarType::GregorianTransliteratedFrench),
        (0x0E, CalendarType::JapaneseLunar),
        (0x0F, CalendarType::ChineseLunar),
        (0x10, CalendarType::Saka),
        (0x11, CalendarType::LunarEtoChinese),
        (0x12, CalendarType::LunarEtoKorean),
        (0x13, CalendarType::LunarRokuyou),
        (0x14, CalendarType::KoreanLunar),
        (0x17, CalendarType::UmAlQura),
    ];

    pub fn code(self) -> u16 {
        Self::TABLE
            .iter()
            .find(|(_, cal)| *cal == self)
            .map_or(0, |(code, _)| *code)
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, cal)| *cal)
    }
}

/// How the occurrence sequence ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminate {
    ByEndDate,
    AfterCount(u32),
    NoEnd,
}

impl Terminate {
    /// Low byte of the wire end-type code.
    pub fn code(self) -> u8 {
        match self {
            Terminate::ByEndDate => 0x21,
            Terminate::AfterCount(_) => 0x22,
            Terminate::NoEnd => 0x23,
        }
    }
}

/// A single occurrence whose details differ from the pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModifiedOccurrence {
    /// Local midnight of the day the occurrence would have started on.
    pub base_date_local: i64,
    pub start_local: i64,
    pub end_local: i64,
    /// Override bits as found on the wire; see [`crate::fields`].
    pub changed_fields: u16,
    pub subject: Option<String>,
    pub location: Option<String>,
    pub reminder_minutes_before: Option<u32>,
    pub reminder_enabled: Option<bool>,
    pub busy_status: Option<u32>,
    pub all_day: Option<bool>,
    pub color_label: Option<u32>,
}

impl ModifiedOccurrence {
    /// An occurrence moved to `start_local..end_local`, with no other overrides.
    pub fn moved(base_date_local: i64, start_local: i64, end_local: i64) -> Self {
        Self {
            base_date_local: time::day_start(base_date_local),
            start_local,
            end_local,
            ..Self::default()
        }
    }

    /// `changed_fields` plus the bit of every override that is present.
    pub fn effective_mask(&self) -> u16 {
        let mut mask = self.changed_fields;
        let present = [
            (self.subject.is_some(), fields::SUBJECT),
            (self.location.is_some(), fields::LOCATION),
            (self.reminder_minutes_before.is_some(), fields::REMINDER_DELTA),
            (self.reminder_enabled.is_some(), fields::REMINDER_SET),
            (self.busy_status.is_some(), fields::BUSY_STATUS),
            (self.all_day.is_some(), fields::SUB_TYPE),
            (self.color_label.is_some(), fields::APPT_COLOR),
        ];
        for (set, bit) in present {
            if set {
                mask |= bit;
            }
        }
        mask
    }
}

/// Decoded or host-built recurrence pattern.
///
/// The fields the encoder requires (`terminate`, range bounds and time
/// offsets) are optional so that partial decodes and half-built patterns are
/// representable; [`encode`](crate::encode) reports whichever is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrencePattern {
    pub frequency: Frequency,
    pub variant: PatternVariant,
    pub calendar_type: CalendarType,
    /// Minutes for daily patterns, weeks for weekly, months otherwise.
    pub every_n: u32,
    /// Sliding (task-style) pattern: the next occurrence follows completion.
    pub regenerating: bool,
    pub weekday_mask: u8,
    pub month_day: u8,
    /// 1-4, or [`LAST_WEEK`].
    pub nth_week: u8,
    /// Yearly only: minutes since the start of a non-leap year.
    pub month_of_year: u32,
    pub terminate: Option<Terminate>,
    pub occurrence_count: u32,
    pub range_start_local: Option<i64>,
    pub range_end_local: Option<i64>,
    pub start_offset_minutes: Option<u32>,
    pub end_offset_minutes: Option<u32>,
    pub deleted_occurrences: BTreeSet<i64>,
    pub modified_occurrences: Vec<ModifiedOccurrence>,
}

impl RecurrencePattern {
    /// An empty pattern of the given shape; the decoder starts from this.
    pub fn new(frequency: Frequency, variant: PatternVariant) -> Self {
        Self {
            frequency,
            variant,
            calendar_type: CalendarType::Default,
            every_n: 0,
            regenerating: false,
            weekday_mask: 0,
            month_day: 0,
            nth_week: 0,
            month_of_year: 0,
            terminate: None,
            occurrence_count: 0,
            range_start_local: None,
            range_end_local: None,
            start_offset_minutes: None,
            end_offset_minutes: None,
            deleted_occurrences: BTreeSet::new(),
            modified_occurrences: Vec::new(),
        }
    }

    /// Every `every_n_minutes` (a multiple of a day in practice).
    pub fn daily(every_n_minutes: u32) -> Self {
        Self {
            every_n: every_n_minutes,
            ..Self::new(Frequency::Daily, PatternVariant::Day)
        }
    }

    /// Every Monday through Friday.
    pub fn every_workday() -> Self {
        Self {
            every_n: time::MINUTES_PER_DAY,
            weekday_mask: WORKDAYS,
            ..Self::new(Frequency::Daily, PatternVariant::Week)
        }
    }

    /// The masked weekdays of every `every_n`-th week.
    pub fn weekly(every_n: u32, weekday_mask: u8) -> Self {
        Self {
            every_n,
            weekday_mask,
            ..Self::new(Frequency::Weekly, PatternVariant::Week)
        }
    }

    /// Day `month_day` of every `every_n`-th month.
    pub fn monthly(every_n: u32, month_day: u8) -> Self {
        Self {
            every_n,
            month_day,
            ..Self::new(Frequency::Monthly, PatternVariant::Month)
        }
    }

    /// The `nth_week`-th masked weekday of every `every_n`-th month.
    pub fn monthly_nth(every_n: u32, nth_week: u8, weekday_mask: u8) -> Self {
        Self {
            every_n,
            nth_week,
            weekday_mask,
            ..Self::new(Frequency::Monthly, PatternVariant::MonthNth)
        }
    }

    /// Day `month_day` of `month` (1-12) every year.
    pub fn yearly(month: u32, month_day: u8) -> Self {
        Self {
            every_n: 12,
            month_day,
            month_of_year: time::year_offset_of_month(month),
            ..Self::new(Frequency::Yearly, PatternVariant::Month)
        }
    }

    /// The `nth_week`-th masked weekday of `month` (1-12) every year.
    pub fn yearly_nth(month: u32, nth_week: u8, weekday_mask: u8) -> Self {
        Self {
            every_n: 12,
            nth_week,
            weekday_mask,
            month_of_year: time::year_offset_of_month(month),
            ..Self::new(Frequency::Yearly, PatternVariant::MonthNth)
        }
    }

    /// Set the first day of the recurrence (floored to local midnight).
    pub fn starting(mut self, start_local: i64) -> Self {
        self.set_range_start(start_local);
        self
    }

    /// Set the occurrence time of day as minutes after local midnight.
    pub fn at(mut self, start_offset_minutes: u32, end_offset_minutes: u32) -> Self {
        self.start_offset_minutes = Some(start_offset_minutes);
        self.end_offset_minutes = Some(end_offset_minutes);
        self
    }

    pub fn ending(mut self, terminate: Terminate) -> Self {
        self.set_terminate(terminate);
        self
    }

    /// End on the given local day.
    pub fn until(mut self, end_local: i64) -> Self {
        self.terminate = Some(Terminate::ByEndDate);
        self.range_end_local = Some(time::day_start(end_local));
        self
    }

    pub fn sliding(mut self) -> Self {
        self.regenerating = true;
        self
    }

    /// Change the recurrence start. A count-terminated pattern's cached end
    /// no longer holds and is dropped until the next encode.
    pub fn set_range_start(&mut self, start_local: i64) {
        self.range_start_local = Some(time::day_start(start_local));
        if matches!(self.terminate, Some(Terminate::AfterCount(_))) {
            self.range_end_local = None;
        }
    }

    /// Change the termination mode, keeping `occurrence_count` in step.
    pub fn set_terminate(&mut self, terminate: Terminate) {
        match terminate {
            Terminate::AfterCount(n) => {
                self.occurrence_count = n;
                self.range_end_local = None;
            }
            Terminate::NoEnd => {
                self.range_end_local = Some(time::from_pattern_minutes(time::NO_END_PATTERN_MINUTES));
            }
            Terminate::ByEndDate => {}
        }
        self.terminate = Some(terminate);
    }

    /// Delete the occurrence on `base_date_local`, dropping any modification
    /// recorded for the same day.
    pub fn delete_occurrence(&mut self, base_date_local: i64) {
        let day = time::day_start(base_date_local);
        self.modified_occurrences.retain(|m| m.base_date_local != day);
        self.deleted_occurrences.insert(day);
    }

    /// Record a modified occurrence, replacing any earlier record or deletion
    /// for the same base day.
    pub fn modify_occurrence(&mut self, mut occurrence: ModifiedOccurrence) {
        occurrence.base_date_local = time::day_start(occurrence.base_date_local);
        let day = occurrence.base_date_local;
        self.deleted_occurrences.remove(&day);
        match self
            .modified_occurrences
            .iter_mut()
            .find(|m| m.base_date_local == day)
        {
            Some(existing) => *existing = occurrence,
            None => self.modified_occurrences.push(occurrence),
        }
    }

    /// Undo a deletion or modification, restoring the grid occurrence.
    pub fn restore_occurrence(&mut self, base_date_local: i64) {
        let day = time::day_start(base_date_local);
        self.deleted_occurrences.remove(&day);
        self.modified_occurrences.retain(|m| m.base_date_local != day);
    }

    pub fn is_deleted(&self, base_date_local: i64) -> bool {
        self.deleted_occurrences
            .contains(&time::day_start(base_date_local))
    }

    pub fn modified_for(&self, base_date_local: i64) -> Option<&ModifiedOccurrence> {
        let day = time::day_start(base_date_local);
        self.modified_occurrences
            .iter()
            .find(|m| m.base_date_local == day)
    }
}
