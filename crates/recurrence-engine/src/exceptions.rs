//! Split raw exception records into deleted and modified occurrences.
//!
//! The blob lists the base date of every exception, deleted or modified, and
//! separately a detailed record for each modified one. A listed base date with
//! no detailed record on the same day is a deletion.

use std::collections::{BTreeSet, HashSet};

use crate::pattern::ModifiedOccurrence;
use crate::time;

/// Result of [`classify`]. `deleted` never shares a day with any `modified`
/// record's base date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub deleted: BTreeSet<i64>,
    pub modified: Vec<ModifiedOccurrence>,
}

/// Classify raw exception base dates against detailed records.
///
/// Every detailed record is kept as modified (in its original order), keyed by
/// its own base date even when that date is missing from `base_dates`.
pub fn classify(base_dates: &[i64], detailed: Vec<ModifiedOccurrence>) -> Classified {
    let modified: Vec<ModifiedOccurrence> = detailed
        .into_iter()
        .map(|mut m| {
            m.base_date_local = time::day_start(m.base_date_local);
            m
        })
        .collect();

    let modified_days: HashSet<i64> = modified.iter().map(|m| m.base_date_local).collect();

    let deleted = base_dates
        .iter()
        .map(|&d| time::day_start(d))
        .filter(|d| !modified_days.contains(d))
        .collect();

    Classified { deleted, modified }
}
