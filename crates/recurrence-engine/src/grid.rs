//! Candidate base dates of a pattern, in ascending order.
//!
//! The expander walks this grid to produce occurrences and the encoder walks
//! it to anchor the range start and derive a count-terminated range end, so
//! the two always agree on which days a pattern selects.

use chrono::{Datelike, NaiveDate};

use crate::pattern::{Frequency, PatternVariant, RecurrencePattern, LAST_WEEK, SUNDAY, WORKDAYS};
use crate::time::{self, MINUTES_PER_DAY, SECS_PER_DAY, SECS_PER_MINUTE};

const SECS_PER_WEEK: i64 = 7 * SECS_PER_DAY;

/// Any valid pattern selects a day within this many steps of any start.
const ANCHOR_MAX_STEPS: u32 = 64;

/// The first day on or after `day_start` that a fixed-grid pattern selects.
///
/// The search moves one week or month at a time whatever the interval, so
/// the interval counts from the first selected period. Sliding patterns are
/// not anchored; their grid is relative to the start.
pub(crate) fn anchor(pattern: &RecurrencePattern, day_start: i64) -> i64 {
    if pattern.regenerating {
        return day_start;
    }
    GridIter::new(pattern, day_start, ANCHOR_MAX_STEPS)
        .unit_step()
        .next()
        .map_or(day_start, time::day_start)
}

#[derive(Debug, Clone)]
enum Cursor {
    /// Fixed-length steps, optionally filtered by weekday.
    Instant {
        at: i64,
        step: i64,
        filter: Option<u8>,
    },
    /// Stepped Sunday-based weeks, each enumerated against the weekday mask.
    Week { start: i64, step: i64 },
    /// Stepped months, each resolved to one day by the variant's rule.
    Month { first: NaiveDate, step: u32 },
    /// Sliding pattern: `index * step` months after the origin.
    Sliding {
        origin: NaiveDate,
        index: u32,
        step: u32,
    },
}

/// Iterator over local-midnight candidate days (or, for sub-day daily
/// periods, candidate instants) on or after a floor day.
///
/// Stops after `max_steps` grid steps or at the pattern-unit ceiling; both are
/// ordinary ends of iteration.
#[derive(Debug, Clone)]
pub(crate) struct GridIter<'a> {
    pattern: &'a RecurrencePattern,
    floor: i64,
    cursor: Cursor,
    buffered: Vec<i64>,
    steps: u32,
    max_steps: u32,
    capped: bool,
    done: bool,
}

impl<'a> GridIter<'a> {
    pub(crate) fn new(pattern: &'a RecurrencePattern, day_start: i64, max_steps: u32) -> Self {
        let cursor = match (pattern.frequency, pattern.variant, pattern.regenerating) {
            (Frequency::Daily, PatternVariant::Week, _) => Cursor::Instant {
                at: day_start,
                step: SECS_PER_DAY,
                filter: Some(WORKDAYS),
            },
            (Frequency::Daily, _, _) => {
                let minutes = if pattern.every_n == 0 {
                    MINUTES_PER_DAY
                } else {
                    pattern.every_n
                };
                Cursor::Instant {
                    at: day_start,
                    step: i64::from(minutes) * SECS_PER_MINUTE,
                    filter: None,
                }
            }
            (Frequency::Weekly, _, true) => {
                let step = i64::from(pattern.every_n.max(1)) * SECS_PER_WEEK;
                Cursor::Instant {
                    at: day_start.saturating_add(step),
                    step,
                    filter: None,
                }
            }
            (Frequency::Weekly, _, false) => Cursor::Week {
                start: day_start - i64::from(time::weekday_index(day_start)) * SECS_PER_DAY,
                step: i64::from(pattern.every_n.max(1)) * SECS_PER_WEEK,
            },
            (Frequency::Monthly | Frequency::Yearly, _, true) => Cursor::Sliding {
                origin: time::date_of(day_start),
                index: 0,
                step: month_step(pattern),
            },
            (Frequency::Monthly, _, false) => Cursor::Month {
                first: time::month_start(time::date_of(day_start)),
                step: month_step(pattern),
            },
            (Frequency::Yearly, _, false) => {
                let date = time::date_of(day_start);
                let month = time::month_from_year_offset(pattern.month_of_year);
                Cursor::Month {
                    first: NaiveDate::from_ymd_opt(date.year(), month, 1)
                        .unwrap_or_else(|| time::year_start(date)),
                    step: month_step(pattern),
                }
            }
        };

        Self {
            pattern,
            floor: day_start,
            cursor,
            buffered: Vec::new(),
            steps: 0,
            max_steps,
            capped: false,
            done: false,
        }
    }

    /// Step one week or month at a time, ignoring the pattern's interval.
    fn unit_step(mut self) -> Self {
        match &mut self.cursor {
            Cursor::Week { step, .. } => *step = SECS_PER_WEEK,
            Cursor::Month { step, .. } if self.pattern.frequency == Frequency::Monthly => *step = 1,
            _ => {}
        }
        self
    }

    /// Whether iteration stopped because the step cap was reached.
    pub(crate) fn capped(&self) -> bool {
        self.capped
    }

    /// Move the cursor forward by whole periods so the next step lands at or
    /// before `target`. The selected days are unchanged; only steps that
    /// could not reach `target` are skipped.
    pub(crate) fn skip_towards(&mut self, target: i64) {
        match &mut self.cursor {
            Cursor::Instant { at, step, .. } | Cursor::Week { start: at, step } => {
                if target > *at && *step > 0 {
                    let periods = (target - *at) / *step;
                    *at += periods * *step;
                }
            }
            Cursor::Month { first, step } => {
                let diff = months_between(*first, time::date_of(target));
                let periods = diff / i64::from(*step);
                if periods > 0 {
                    if let Ok(months) = u32::try_from(periods * i64::from(*step)) {
                        if let Some(next) = time::add_months(*first, months) {
                            *first = next;
                        }
                    }
                }
            }
            Cursor::Sliding {
                origin,
                index,
                step,
            } => {
                let periods = months_between(*origin, time::date_of(target)) / i64::from(*step);
                if let Ok(periods) = u32::try_from(periods) {
                    if periods > *index + 1 {
                        *index = periods - 1;
                    }
                }
            }
        }
    }
}

impl Iterator for GridIter<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let ceiling = time::max_timestamp();
        loop {
            if let Some(day) = self.buffered.pop() {
                return Some(day);
            }
            if self.done {
                return None;
            }
            if self.steps >= self.max_steps {
                tracing::debug!(steps = self.steps, "grid step cap reached");
                self.capped = true;
                self.done = true;
                return None;
            }
            self.steps += 1;

            match &mut self.cursor {
                Cursor::Instant { at, step, filter } => {
                    let candidate = *at;
                    *at = at.saturating_add(*step);
                    if candidate > ceiling {
                        self.done = true;
                        continue;
                    }
                    let selected = filter.map_or(true, |mask| time::weekday_selected(mask, candidate));
                    if candidate >= self.floor && selected {
                        return Some(candidate);
                    }
                }
                Cursor::Week { start, step } => {
                    let week = *start;
                    *start = start.saturating_add(*step);
                    if week > ceiling {
                        self.done = true;
                        continue;
                    }
                    // Reverse so that `pop` yields ascending days.
                    for offset in (0..7).rev() {
                        let day = week + offset * SECS_PER_DAY;
                        if day >= self.floor
                            && day <= ceiling
                            && time::weekday_selected(self.pattern.weekday_mask, day)
                        {
                            self.buffered.push(day);
                        }
                    }
                }
                Cursor::Month { first, step } => {
                    let month = *first;
                    match time::add_months(month, *step) {
                        Some(next) => *first = next,
                        None => self.done = true,
                    }
                    if time::timestamp_of(month) > ceiling {
                        self.done = true;
                        continue;
                    }
                    if let Some(day) = select_day(self.pattern, month) {
                        let ts = time::timestamp_of(day);
                        if ts >= self.floor && ts <= ceiling {
                            return Some(ts);
                        }
                    }
                }
                Cursor::Sliding {
                    origin,
                    index,
                    step,
                } => {
                    *index += 1;
                    let next = index
                        .checked_mul(*step)
                        .and_then(|months| time::add_months(*origin, months))
                        .map(time::timestamp_of);
                    match next {
                        Some(ts) if ts <= ceiling => return Some(ts),
                        _ => self.done = true,
                    }
                }
            }
        }
    }
}

fn month_step(pattern: &RecurrencePattern) -> u32 {
    match (pattern.frequency, pattern.every_n) {
        (Frequency::Yearly, 0) => 12,
        (_, 0) => 1,
        (_, n) => n,
    }
}

fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    time::months_since_pattern_epoch(to) - time::months_since_pattern_epoch(from)
}

/// The day a monthly or yearly pattern selects within the month starting at
/// `month_first`, or `None` if no day matches.
pub(crate) fn select_day(pattern: &RecurrencePattern, month_first: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = (month_first.year(), month_first.month());
    let last = time::days_in_month(year, month);

    if pattern.variant.is_month_end() {
        return NaiveDate::from_ymd_opt(year, month, last);
    }

    if pattern.variant.is_nth() {
        let mask = match pattern.weekday_mask & 0x7F {
            0 => SUNDAY,
            mask => mask,
        };
        let matches = |day: &u32| {
            NaiveDate::from_ymd_opt(year, month, *day)
                .is_some_and(|d| mask & (1 << d.weekday().num_days_from_sunday()) != 0)
        };
        let day = if pattern.nth_week >= LAST_WEEK {
            (1..=last).rev().find(|d| matches(d))
        } else {
            let nth = usize::from(pattern.nth_week.max(1));
            (1..=last).filter(|d| matches(d)).nth(nth - 1)
        };
        return day.and_then(|d| NaiveDate::from_ymd_opt(year, month, d));
    }

    // Day-of-month, capped to the month's last day.
    time::capped_day(year, month, u32::from(pattern.month_day.max(1)))
}
