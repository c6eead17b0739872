//! Host hook that turns an expanded occurrence into the host's own item.
//!
//! Appointments and tasks materialize differently, so the expander is generic
//! over an [`OccurrenceMaterializer`] instead of returning one fixed shape.
//! Returning `None` drops the candidate from the output.

use crate::expander::OccurrenceInstance;
use crate::timezone::TimezoneRule;

/// One surviving candidate, offered to the materializer.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub base_date_local: i64,
    pub start_offset_minutes: u32,
    pub end_offset_minutes: u32,
    pub tz: &'a TimezoneRule,
    pub reminders_only: bool,
    /// Start/end in UTC plus resolved details, as computed by the expander.
    pub occurrence: &'a OccurrenceInstance,
}

pub trait OccurrenceMaterializer {
    type Item;

    fn materialize(&self, candidate: &Candidate<'_>) -> Option<Self::Item>;
}

impl<T, F> OccurrenceMaterializer for F
where
    F: Fn(&Candidate<'_>) -> Option<T>,
{
    type Item = T;

    fn materialize(&self, candidate: &Candidate<'_>) -> Option<T> {
        self(candidate)
    }
}

/// Materializes the expander's own [`OccurrenceInstance`].
///
/// For reminder queries, occurrences whose resolved reminder is off are
/// dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Instances;

impl OccurrenceMaterializer for Instances {
    type Item = OccurrenceInstance;

    fn materialize(&self, candidate: &Candidate<'_>) -> Option<OccurrenceInstance> {
        if candidate.reminders_only && !candidate.occurrence.details.reminder_enabled {
            return None;
        }
        Some(candidate.occurrence.clone())
    }
}
