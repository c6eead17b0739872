//! Occurrence expansion -- turns a decoded pattern into concrete instances
//! inside a time window, with deleted and modified occurrences applied.
//!
//! Expansion walks the pattern's grid of local base dates from the recurrence
//! start (or, for sliding patterns, the last completion), converts each
//! surviving candidate to UTC through the pattern's [`TimezoneRule`], and
//! hands it to an [`OccurrenceMaterializer`]. A second pass picks up modified
//! occurrences that were moved to a day the grid never visits.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, DEFAULT_MAX_GRID_STEPS};
use crate::error::{RecurrenceError, Result};
use crate::grid::{self, GridIter};
use crate::materializer::{Candidate, Instances, OccurrenceMaterializer};
use crate::pattern::{ModifiedOccurrence, RecurrencePattern, Terminate};
use crate::time::{self, SECS_PER_DAY, SECS_PER_MINUTE};
use crate::timezone::TimezoneRule;

/// Per-occurrence details, either the item's defaults or those defaults with
/// a modified occurrence's overrides applied.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OccurrenceDetails {
    pub subject: Option<String>,
    pub location: Option<String>,
    pub reminder_minutes_before: Option<u32>,
    pub reminder_enabled: bool,
    pub busy_status: Option<u32>,
    pub all_day: bool,
    pub color_label: Option<u32>,
}

impl OccurrenceDetails {
    /// These details with every field `occ` overrides replaced.
    pub fn with_overrides(&self, occ: &ModifiedOccurrence) -> Self {
        Self {
            subject: occ.subject.clone().or_else(|| self.subject.clone()),
            location: occ.location.clone().or_else(|| self.location.clone()),
            reminder_minutes_before: occ.reminder_minutes_before.or(self.reminder_minutes_before),
            reminder_enabled: occ.reminder_enabled.unwrap_or(self.reminder_enabled),
            busy_status: occ.busy_status.or(self.busy_status),
            all_day: occ.all_day.unwrap_or(self.all_day),
            color_label: occ.color_label.or(self.color_label),
        }
    }
}

/// A single expanded occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccurrenceInstance {
    pub start_utc: i64,
    pub end_utc: i64,
    pub base_date_local: i64,
    pub is_exception: bool,
    /// Override bits of the modified occurrence, 0 for regular ones.
    pub changed_fields: u16,
    pub details: OccurrenceDetails,
}

impl OccurrenceInstance {
    pub fn start(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.start_utc, 0)
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.end_utc, 0)
    }
}

/// What to expand. Window bounds are UTC epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpansionRequest {
    pub window_start: i64,
    pub window_end: i64,
    /// Maximum instances returned; 0 means no limit.
    pub limit: usize,
    /// Only occurrences that will fire a reminder are wanted.
    pub reminders_only: bool,
    /// Local completion time of the previous occurrence of a sliding pattern.
    pub last_completed: Option<i64>,
    /// Details of the item itself, used where a modified occurrence does not
    /// override them.
    pub defaults: OccurrenceDetails,
}

impl ExpansionRequest {
    pub fn new(window_start: i64, window_end: i64) -> Self {
        Self {
            window_start,
            window_end,
            ..Self::default()
        }
    }

    /// Everything from `window_start` on, the "all future occurrences" query.
    pub fn all_from(window_start: i64) -> Self {
        Self::new(window_start, time::max_timestamp())
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn reminders_only(mut self) -> Self {
        self.reminders_only = true;
        self
    }

    pub fn completed_at(mut self, last_completed_local: i64) -> Self {
        self.last_completed = Some(last_completed_local);
        self
    }

    pub fn with_defaults(mut self, defaults: OccurrenceDetails) -> Self {
        self.defaults = defaults;
        self
    }
}

/// Expands one pattern under one timezone rule.
#[derive(Debug, Clone, Copy)]
pub struct OccurrenceExpander<'a> {
    pattern: &'a RecurrencePattern,
    tz: &'a TimezoneRule,
    max_grid_steps: u32,
}

impl<'a> OccurrenceExpander<'a> {
    pub fn new(pattern: &'a RecurrencePattern, tz: &'a TimezoneRule) -> Self {
        Self {
            pattern,
            tz,
            max_grid_steps: DEFAULT_MAX_GRID_STEPS,
        }
    }

    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.max_grid_steps = config.max_grid_steps;
        self
    }

    /// Cap on grid steps per expansion. Reaching it ends expansion early
    /// without an error.
    pub fn with_max_grid_steps(mut self, max_grid_steps: u32) -> Self {
        self.max_grid_steps = max_grid_steps;
        self
    }

    /// Expand into [`OccurrenceInstance`]s.
    pub fn generate(&self, request: &ExpansionRequest) -> Result<Vec<OccurrenceInstance>> {
        self.generate_with(request, &Instances)
    }

    /// Expand, materializing each surviving occurrence through `materializer`.
    ///
    /// Output is ordered by UTC start and holds at most `request.limit` items
    /// when the limit is nonzero.
    ///
    /// # Errors
    /// Returns `RecurrenceError::MissingRequiredField` if the pattern has no
    /// range start and the request supplies no completion date for it.
    #[tracing::instrument(
        skip_all,
        fields(
            frequency = ?self.pattern.frequency,
            window_start = request.window_start,
            window_end = request.window_end,
            limit = request.limit,
        )
    )]
    pub fn generate_with<M: OccurrenceMaterializer>(
        &self,
        request: &ExpansionRequest,
        materializer: &M,
    ) -> Result<Vec<M::Item>> {
        let window = Window {
            start: time::clamp_timestamp(request.window_start),
            end: time::clamp_timestamp(request.window_end),
        };
        if window.end < window.start {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        if request.reminders_only && !request.defaults.reminder_enabled {
            self.reminder_exceptions(request, window, materializer, &mut out);
        } else {
            self.expand_grid(request, window, materializer, &mut out)?;
        }

        out.sort_by_key(|(start, _)| *start);
        if request.limit > 0 {
            out.truncate(request.limit);
        }
        tracing::debug!(count = out.len(), "expanded occurrences");
        Ok(out.into_iter().map(|(_, item)| item).collect())
    }

    /// Reminder query on an item whose own reminder is off: only modified
    /// occurrences that switch the reminder on can match, so the grid is
    /// never walked.
    fn reminder_exceptions<M: OccurrenceMaterializer>(
        &self,
        request: &ExpansionRequest,
        window: Window,
        materializer: &M,
        out: &mut Vec<(i64, M::Item)>,
    ) {
        let mut candidates: Vec<&ModifiedOccurrence> = self
            .pattern
            .modified_occurrences
            .iter()
            .filter(|m| m.reminder_enabled == Some(true))
            .filter(|m| !self.pattern.deleted_occurrences.contains(&m.base_date_local))
            .collect();
        candidates.sort_by_key(|m| m.start_local);

        for occ in candidates {
            if request.limit > 0 && out.len() >= request.limit {
                break;
            }
            let instance = self.modified_instance(occ, &request.defaults);
            if window.contains(instance.start_utc, instance.end_utc) {
                self.offer(instance, request, materializer, out);
            }
        }
    }

    fn expand_grid<M: OccurrenceMaterializer>(
        &self,
        request: &ExpansionRequest,
        window: Window,
        materializer: &M,
        out: &mut Vec<(i64, M::Item)>,
    ) -> Result<()> {
        let pattern = self.pattern;
        let day_start = match (pattern.regenerating, request.last_completed) {
            (true, Some(completed)) => time::day_start(time::clamp_timestamp(completed)),
            _ => grid::anchor(
                pattern,
                time::day_start(time::clamp_timestamp(
                    pattern
                        .range_start_local
                        .ok_or(RecurrenceError::MissingRequiredField("range_start_local"))?,
                )),
            ),
        };

        let range_end_utc = pattern
            .range_end_local
            .map_or(window.end, |end| self.tz.to_utc(time::clamp_timestamp(end)));
        let day_end = time::day_start(self.tz.to_local(window.end.min(range_end_utc)));

        let (start_offset, end_offset) = self.offsets();
        let count_limit = match pattern.terminate {
            Some(Terminate::AfterCount(n)) => Some(n),
            _ => None,
        };

        let mut grid = GridIter::new(pattern, day_start, self.max_grid_steps);
        if count_limit.is_none() {
            // Counted patterns must walk every slot from the start; others may
            // jump close to the window. Back off by the occurrence length so
            // occurrences running into the window are still seen.
            let span = i64::from(end_offset.saturating_sub(start_offset)) * SECS_PER_MINUTE;
            let target = time::day_start(self.tz.to_local(window.start))
                .saturating_sub(span)
                .saturating_sub(SECS_PER_DAY);
            grid.skip_towards(target);
        }

        let mut seen_modified = HashSet::new();
        let mut slots = 0u32;
        for candidate in grid.by_ref() {
            let base = time::day_start(candidate);
            if base > day_end {
                break;
            }
            if let Some(n) = count_limit {
                if slots >= n {
                    break;
                }
                slots += 1;
            }
            // A slot kept earlier may have been moved later, so only stop once
            // this slot's own start is past the current limit-th start.
            if request.limit > 0 && out.len() >= request.limit {
                let natural = self
                    .tz
                    .to_utc(candidate + i64::from(start_offset) * SECS_PER_MINUTE);
                if natural > nth_start(out, request.limit) {
                    break;
                }
            }

            if pattern.deleted_occurrences.contains(&base) {
                tracing::trace!(base, "skipping deleted occurrence");
                continue;
            }

            let instance = match pattern.modified_for(base) {
                Some(occ) => {
                    seen_modified.insert(base);
                    self.modified_instance(occ, &request.defaults)
                }
                None => {
                    let start_local = candidate + i64::from(start_offset) * SECS_PER_MINUTE;
                    let end_local = candidate + i64::from(end_offset) * SECS_PER_MINUTE;
                    OccurrenceInstance {
                        start_utc: self.tz.to_utc(start_local),
                        end_utc: self.tz.to_utc(end_local),
                        base_date_local: base,
                        is_exception: false,
                        changed_fields: 0,
                        details: request.defaults.clone(),
                    }
                }
            };

            if window.contains(instance.start_utc, instance.end_utc) {
                self.offer(instance, request, materializer, out);
            } else {
                tracing::trace!(base, start = instance.start_utc, "candidate outside window");
            }
        }
        if grid.capped() {
            tracing::warn!(
                max_grid_steps = self.max_grid_steps,
                "expansion stopped at grid step cap"
            );
        }

        // Modified occurrences the grid did not reach, typically moved to a
        // day outside their original slot.
        for occ in &pattern.modified_occurrences {
            if seen_modified.contains(&occ.base_date_local)
                || pattern.deleted_occurrences.contains(&occ.base_date_local)
            {
                continue;
            }
            let instance = self.modified_instance(occ, &request.defaults);
            if window.contains(instance.start_utc, instance.end_utc) {
                self.offer(instance, request, materializer, out);
            }
        }
        Ok(())
    }

    /// Time-of-day offsets; task patterns carry none and expand at midnight.
    fn offsets(&self) -> (u32, u32) {
        let start = self.pattern.start_offset_minutes.unwrap_or(0);
        let end = self.pattern.end_offset_minutes.unwrap_or(start);
        (start, end)
    }

    fn modified_instance(
        &self,
        occ: &ModifiedOccurrence,
        defaults: &OccurrenceDetails,
    ) -> OccurrenceInstance {
        OccurrenceInstance {
            start_utc: self.tz.to_utc(occ.start_local),
            end_utc: self.tz.to_utc(occ.end_local),
            base_date_local: occ.base_date_local,
            is_exception: true,
            changed_fields: occ.effective_mask(),
            details: defaults.with_overrides(occ),
        }
    }

    fn offer<M: OccurrenceMaterializer>(
        &self,
        instance: OccurrenceInstance,
        request: &ExpansionRequest,
        materializer: &M,
        out: &mut Vec<(i64, M::Item)>,
    ) {
        let (start_offset, end_offset) = self.offsets();
        let candidate = Candidate {
            base_date_local: instance.base_date_local,
            start_offset_minutes: start_offset,
            end_offset_minutes: end_offset,
            tz: self.tz,
            reminders_only: request.reminders_only,
            occurrence: &instance,
        };
        if let Some(item) = materializer.materialize(&candidate) {
            out.push((instance.start_utc, item));
        }
    }
}

/// The `n`-th smallest start collected so far; `out` holds at least `n` items.
fn nth_start<T>(out: &[(i64, T)], n: usize) -> i64 {
    let mut starts: Vec<i64> = out.iter().map(|(start, _)| *start).collect();
    let (_, nth, _) = starts.select_nth_unstable(n - 1);
    *nth
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: i64,
    end: i64,
}

impl Window {
    /// Intersection test; a zero-length occurrence exactly at the window
    /// start also counts.
    fn contains(&self, start: i64, end: i64) -> bool {
        (start < self.end && end > self.start) || (start == end && start == self.start)
    }
}

/// Expand `pattern` over `[window_start, window_end)` with default settings.
///
/// # Errors
/// Returns `RecurrenceError::MissingRequiredField` if the pattern has no
/// range start.
pub fn generate(
    pattern: &RecurrencePattern,
    tz: &TimezoneRule,
    window_start: i64,
    window_end: i64,
    limit: usize,
    reminders_only: bool,
) -> Result<Vec<OccurrenceInstance>> {
    let request = ExpansionRequest {
        limit,
        reminders_only,
        ..ExpansionRequest::new(window_start, window_end)
    };
    OccurrenceExpander::new(pattern, tz).generate(&request)
}
