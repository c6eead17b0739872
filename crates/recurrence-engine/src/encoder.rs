//! Recurrence pattern blob encoder.
//!
//! Encoding re-derives the stored range from the pattern itself: the range
//! start is anchored on the first day the pattern actually selects, and a
//! count-terminated pattern gets its end date by stepping the same grid the
//! expander walks. A decoded copy of the output therefore expands to the same
//! occurrences as the input.

use std::collections::BTreeSet;

use crate::decoder::{
    CODE_BASE, MAX_DAILY_PERIOD_MINUTES, MAX_PERIOD, READER_VERSION, READER_VERSION2,
    WRITER_VERSION, WRITER_VERSION2,
};
use crate::error::{RecurrenceError, Result};
use crate::fields;
use crate::grid::{self, GridIter};
use crate::pattern::{Frequency, PatternVariant, RecurrencePattern, Terminate, LAST_WEEK, WORKDAYS};
use crate::time::{self, MINUTES_PER_DAY, SECS_PER_MINUTE};
use crate::wire::ByteWriter;

/// First-day-of-week field; reserved, always written as Monday.
const FIRST_DAY_OF_WEEK: u32 = 1;

/// Fixed frequency body of the "every workday" daily variant: first date
/// time, period, sliding flag, weekday mask.
const WORKDAY_BODY: [u32; 4] = [6 * MINUTES_PER_DAY, 1, 0, WORKDAYS as u32];

/// Size of the change-highlight value written per exception.
const CHANGE_HIGHLIGHT_SIZE: u32 = 4;

/// Encode a pattern into its blob.
///
/// # Errors
/// Returns `RecurrenceError::MissingRequiredField` when the termination, the
/// range start, the range end of a date-terminated pattern, or either time
/// offset is unset, and `RecurrenceError::OutOfRange` for field values the
/// wire format cannot carry. No bytes are produced on error.
#[tracing::instrument(
    skip(pattern),
    fields(
        frequency = ?pattern.frequency,
        deleted = pattern.deleted_occurrences.len(),
        modified = pattern.modified_occurrences.len(),
    )
)]
pub fn encode(pattern: &RecurrencePattern) -> Result<Vec<u8>> {
    let terminate = pattern
        .terminate
        .ok_or(RecurrenceError::MissingRequiredField("terminate"))?;
    let start_offset = pattern
        .start_offset_minutes
        .ok_or(RecurrenceError::MissingRequiredField("start_offset_minutes"))?;
    let end_offset = pattern
        .end_offset_minutes
        .ok_or(RecurrenceError::MissingRequiredField("end_offset_minutes"))?;
    validate(pattern)?;
    let (range_start, range_end) = resolve_range(pattern)?;

    let mut w = ByteWriter::new();

    // Header.
    w.put_u16(READER_VERSION);
    w.put_u16(WRITER_VERSION);
    w.put_u16(CODE_BASE as u16 | u16::from(pattern.frequency.code()));
    w.put_u16(pattern.variant.code());
    w.put_u16(pattern.calendar_type.code());

    write_frequency_body(&mut w, pattern, range_start);

    // Trailer.
    w.put_u32(CODE_BASE | u32::from(terminate.code()));
    w.put_u32(match terminate {
        Terminate::AfterCount(n) => n,
        _ => pattern.occurrence_count,
    });
    w.put_u32(FIRST_DAY_OF_WEEK);

    // Every exception's base date, deleted or modified, ascending.
    let base_dates: BTreeSet<i64> = pattern
        .deleted_occurrences
        .iter()
        .copied()
        .chain(pattern.modified_occurrences.iter().map(|m| m.base_date_local))
        .map(time::day_start)
        .collect();
    put_count(&mut w, base_dates.len(), "deleted_occurrences")?;
    for date in &base_dates {
        w.put_u32(time::to_pattern_minutes(*date));
    }

    let mut modified_starts: Vec<i64> = pattern
        .modified_occurrences
        .iter()
        .map(|m| time::day_start(m.start_local))
        .collect();
    modified_starts.sort_unstable();
    put_count(&mut w, modified_starts.len(), "modified_occurrences")?;
    for date in &modified_starts {
        w.put_u32(time::to_pattern_minutes(*date));
    }

    w.put_u32(time::to_pattern_minutes(range_start));
    w.put_u32(time::to_pattern_minutes(range_end));

    // Appointment section.
    w.put_u32(READER_VERSION2);
    w.put_u32(WRITER_VERSION2);
    w.put_u32(start_offset);
    w.put_u32(end_offset);

    let exception_count = u16::try_from(pattern.modified_occurrences.len()).map_err(|_| {
        RecurrenceError::OutOfRange {
            field: "modified_occurrences",
            value: pattern.modified_occurrences.len() as i64,
        }
    })?;
    w.put_u16(exception_count);

    let original_start =
        |base: i64| time::to_pattern_minutes(base + i64::from(start_offset) * SECS_PER_MINUTE);

    for occ in &pattern.modified_occurrences {
        let mask = occ.effective_mask();
        w.put_u32(time::to_pattern_minutes(occ.start_local));
        w.put_u32(time::to_pattern_minutes(occ.end_local));
        w.put_u32(original_start(occ.base_date_local));
        w.put_u16(mask);
        fields::write_overrides(&mut w, occ, mask);
    }

    // Extended section: change highlight plus the UTF-16 subject/location.
    w.put_u32(0);
    for occ in &pattern.modified_occurrences {
        let mask = occ.effective_mask();
        w.put_u32(CHANGE_HIGHLIGHT_SIZE);
        w.put_u32(0);
        w.put_u32(0);
        if mask & fields::EXTENDED_TEXT != 0 {
            w.put_u32(time::to_pattern_minutes(occ.start_local));
            w.put_u32(time::to_pattern_minutes(occ.end_local));
            w.put_u32(original_start(occ.base_date_local));
            if mask & fields::SUBJECT != 0 {
                fields::write_wide_text(&mut w, occ.subject.as_deref().unwrap_or_default());
            }
            if mask & fields::LOCATION != 0 {
                fields::write_wide_text(&mut w, occ.location.as_deref().unwrap_or_default());
            }
            w.put_u32(0);
        }
    }
    w.put_u32(0);

    tracing::debug!(bytes = w.len(), "encoded recurrence pattern");
    Ok(w.into_inner())
}

/// The range start and end `encode` would write, as local midnights.
///
/// The start is moved forward to the first day the pattern selects. The end
/// of a count-terminated pattern is the day of its last counted occurrence;
/// a pattern that never ends gets the far-future sentinel.
///
/// # Errors
/// Returns `RecurrenceError::MissingRequiredField` if the termination or
/// range start is unset, or if a date-terminated pattern has no range end.
/// Returns `RecurrenceError::OutOfRange` if that end falls before the first
/// selected day.
pub fn resolve_range(pattern: &RecurrencePattern) -> Result<(i64, i64)> {
    let terminate = pattern
        .terminate
        .ok_or(RecurrenceError::MissingRequiredField("terminate"))?;
    let start = time::day_start(
        pattern
            .range_start_local
            .ok_or(RecurrenceError::MissingRequiredField("range_start_local"))?,
    );

    let anchor = grid::anchor(pattern, start);

    let end = match terminate {
        Terminate::ByEndDate => {
            let end = pattern
                .range_end_local
                .ok_or(RecurrenceError::MissingRequiredField("range_end_local"))?;
            if time::day_start(end) < anchor {
                return Err(RecurrenceError::OutOfRange {
                    field: "range_end_local",
                    value: end,
                });
            }
            end
        }
        Terminate::NoEnd => time::from_pattern_minutes(time::NO_END_PATTERN_MINUTES),
        Terminate::AfterCount(0) => anchor,
        Terminate::AfterCount(count) => {
            let max_steps = count.saturating_mul(2).saturating_add(16);
            match GridIter::new(pattern, anchor, max_steps).nth(count as usize - 1) {
                Some(last) => time::day_start(last),
                None => {
                    tracing::warn!(count, "occurrence count runs past the pattern range, clamping");
                    time::day_start(time::max_timestamp())
                }
            }
        }
    };

    Ok((anchor, end))
}

fn write_frequency_body(w: &mut ByteWriter, p: &RecurrencePattern, anchor: i64) {
    let anchor_minutes = i64::from(time::to_pattern_minutes(anchor));

    if p.frequency == Frequency::Daily && p.variant == PatternVariant::Week {
        for value in WORKDAY_BODY {
            w.put_u32(value);
        }
        return;
    }

    let first_date_time = match p.frequency {
        Frequency::Daily => anchor_minutes % i64::from(p.every_n.max(1)),
        Frequency::Weekly => {
            let period = i64::from(p.every_n.max(1)) * 7 * i64::from(MINUTES_PER_DAY);
            let weekday = i64::from(time::weekday_index(anchor));
            anchor_minutes % period - (weekday - 1) * i64::from(MINUTES_PER_DAY)
        }
        Frequency::Monthly => {
            let months = time::months_since_pattern_epoch(time::date_of(anchor));
            let index = months.rem_euclid(i64::from(p.every_n.max(1)));
            i64::from(time::pattern_minutes_of_month_index(index as u32))
        }
        Frequency::Yearly => i64::from(p.month_of_year),
    };
    // The weekly value can be negative; it is stored as its 32-bit pattern.
    w.put_u32(first_date_time as u32);
    w.put_u32(p.every_n);
    w.put_u32(u32::from(p.regenerating));

    match p.frequency {
        Frequency::Daily => {}
        Frequency::Weekly => {
            if !p.regenerating {
                w.put_u32(u32::from(p.weekday_mask));
            }
        }
        Frequency::Monthly | Frequency::Yearly => {
            if p.variant.is_nth() {
                w.put_u32(u32::from(p.weekday_mask));
                w.put_u32(u32::from(p.nth_week));
            } else if p.variant.is_month_end() && p.month_day == 0 {
                w.put_u32(31);
            } else {
                w.put_u32(u32::from(p.month_day));
            }
        }
    }
}

/// Reject values the decoder would refuse, so every encoded blob decodes.
fn validate(p: &RecurrencePattern) -> Result<()> {
    let out_of_range = |field: &'static str, value: u32| {
        Err(RecurrenceError::OutOfRange {
            field,
            value: i64::from(value),
        })
    };

    if !p.variant.allowed_for(p.frequency) {
        return out_of_range("variant", u32::from(p.variant.code()));
    }

    match p.frequency {
        Frequency::Daily if p.variant == PatternVariant::Week => {}
        Frequency::Daily => {
            if p.every_n == 0 || p.every_n > MAX_DAILY_PERIOD_MINUTES {
                return out_of_range("every_n", p.every_n);
            }
        }
        Frequency::Weekly | Frequency::Monthly => {
            if p.every_n == 0 || p.every_n > MAX_PERIOD {
                return out_of_range("every_n", p.every_n);
            }
        }
        Frequency::Yearly => {
            let valid = if p.regenerating {
                p.every_n > 0 && p.every_n % 12 == 0
            } else {
                p.every_n == 12
            };
            if !valid {
                return out_of_range("every_n", p.every_n);
            }
        }
    }

    let needs_mask = match p.frequency {
        Frequency::Weekly => !p.regenerating,
        Frequency::Monthly | Frequency::Yearly => p.variant.is_nth(),
        Frequency::Daily => false,
    };
    if needs_mask && (p.weekday_mask == 0 || p.weekday_mask > 0x7F) {
        return out_of_range("weekday_mask", u32::from(p.weekday_mask));
    }

    if matches!(p.frequency, Frequency::Monthly | Frequency::Yearly) {
        if p.variant.is_nth() {
            if !(1..=LAST_WEEK).contains(&p.nth_week) {
                return out_of_range("nth_week", u32::from(p.nth_week));
            }
        } else if !p.variant.is_month_end() && !(1..=31).contains(&p.month_day) {
            return out_of_range("month_day", u32::from(p.month_day));
        }
    }
    Ok(())
}

fn put_count(w: &mut ByteWriter, count: usize, field: &'static str) -> Result<()> {
    let count = u32::try_from(count).map_err(|_| RecurrenceError::OutOfRange {
        field,
        value: count as i64,
    })?;
    w.put_u32(count);
    Ok(())
}
