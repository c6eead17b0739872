//! Export of a pattern as an RFC 5545 RRULE value.
//!
//! Day-of-month selection caps to the month's last day, which RRULE has no
//! direct spelling for; days 29-31 are written as a `BYMONTHDAY` set reduced
//! with `BYSETPOS=-1`, which picks the same day in every month. Weekly rules
//! carry `WKST=SU` because pattern weeks start on Sunday.

use crate::error::{RecurrenceError, Result};
use crate::pattern::{Frequency, PatternVariant, RecurrencePattern, Terminate, LAST_WEEK, WORKDAYS};
use crate::time::{self, MINUTES_PER_DAY};

const DAY_CODES: [&str; 7] = ["SU", "MO", "TU", "WE", "TH", "FR", "SA"];

/// Render `pattern` as an RRULE value such as `FREQ=WEEKLY;BYDAY=MO,WE,FR`.
///
/// Exceptions are not part of the rule.
///
/// # Errors
/// Returns `RecurrenceError::NotExpressible` for sliding patterns, whose
/// occurrences depend on completion dates.
pub fn to_rrule(pattern: &RecurrencePattern) -> Result<String> {
    if pattern.regenerating {
        return Err(RecurrenceError::NotExpressible(
            "sliding patterns follow completion dates",
        ));
    }

    let mut parts: Vec<String> = Vec::new();

    match (pattern.frequency, pattern.variant) {
        (Frequency::Daily, PatternVariant::Week) => {
            parts.push("FREQ=WEEKLY".into());
            parts.push(format!("BYDAY={}", by_day(WORKDAYS)));
        }
        (Frequency::Daily, _) => {
            let minutes = pattern.every_n.max(1);
            if minutes % MINUTES_PER_DAY == 0 {
                parts.push("FREQ=DAILY".into());
                push_interval(&mut parts, minutes / MINUTES_PER_DAY);
            } else {
                parts.push("FREQ=MINUTELY".into());
                push_interval(&mut parts, minutes);
            }
        }
        (Frequency::Weekly, _) => {
            parts.push("FREQ=WEEKLY".into());
            push_interval(&mut parts, pattern.every_n);
            parts.push(format!("BYDAY={}", by_day(pattern.weekday_mask)));
            parts.push("WKST=SU".into());
        }
        (Frequency::Monthly, _) => {
            parts.push("FREQ=MONTHLY".into());
            push_interval(&mut parts, pattern.every_n);
            push_day_selection(&mut parts, pattern);
        }
        (Frequency::Yearly, _) => {
            parts.push("FREQ=YEARLY".into());
            push_interval(&mut parts, pattern.every_n / 12);
            parts.push(format!(
                "BYMONTH={}",
                time::month_from_year_offset(pattern.month_of_year)
            ));
            push_day_selection(&mut parts, pattern);
        }
    }

    match pattern.terminate {
        Some(Terminate::AfterCount(n)) => parts.push(format!("COUNT={n}")),
        Some(Terminate::ByEndDate) => {
            let end = pattern
                .range_end_local
                .ok_or(RecurrenceError::MissingRequiredField("range_end_local"))?;
            parts.push(format!(
                "UNTIL={}T235959",
                time::date_of(end).format("%Y%m%d")
            ));
        }
        Some(Terminate::NoEnd) | None => {}
    }

    Ok(parts.join(";"))
}

fn push_interval(parts: &mut Vec<String>, interval: u32) {
    if interval > 1 {
        parts.push(format!("INTERVAL={interval}"));
    }
}

fn push_day_selection(parts: &mut Vec<String>, pattern: &RecurrencePattern) {
    if pattern.variant.is_month_end() {
        parts.push("BYMONTHDAY=-1".into());
    } else if pattern.variant.is_nth() {
        parts.push(format!("BYDAY={}", by_day(pattern.weekday_mask)));
        let pos = if pattern.nth_week >= LAST_WEEK {
            -1
        } else {
            i32::from(pattern.nth_week.max(1))
        };
        parts.push(format!("BYSETPOS={pos}"));
    } else {
        let day = pattern.month_day.clamp(1, 31);
        if day <= 28 {
            parts.push(format!("BYMONTHDAY={day}"));
        } else {
            let days: Vec<String> = (28..=day).map(|d| d.to_string()).collect();
            parts.push(format!("BYMONTHDAY={}", days.join(",")));
            parts.push("BYSETPOS=-1".into());
        }
    }
}

fn by_day(mask: u8) -> String {
    DAY_CODES
        .iter()
        .enumerate()
        .filter(|(bit, _)| mask & (1 << bit) != 0)
        .map(|(_, code)| *code)
        .collect::<Vec<_>>()
        .join(",")
}
