//! Recurrence pattern blob decoder.
//!
//! Decoding is tolerant: each stage is a validation gate, and a failure
//! returns [`Decoded::Partial`] holding everything assembled before it rather
//! than aborting. Callers must not treat a partial result as a pattern.
//!
//! # Layout
//!
//! 1. Header: reader/writer version, frequency, variant, calendar type.
//! 2. Frequency body: first date-time, period, sliding flag, variant fields.
//! 3. Trailer: end type, occurrence count, first day of week, exception count.
//! 4. Exception base dates, modified start dates, range start/end. Task
//!    patterns end here.
//! 5. Second version pair, time-of-day offsets, detailed exception records.
//! 6. Base dates are reconciled against the detailed records.
//! 7. Optional extended section with UTF-16 subject/location text.

use serde::Serialize;

use crate::error::{DecodeError, RecurrenceError};
use crate::exceptions;
use crate::fields;
use crate::pattern::{
    CalendarType, Frequency, ModifiedOccurrence, PatternVariant, RecurrencePattern, Terminate,
    LAST_WEEK,
};
use crate::time;
use crate::wire::ByteReader;

type ReadResult<T> = std::result::Result<T, DecodeError>;

/// Expected value of both header version words.
pub const READER_VERSION: u16 = 0x3004;
pub const WRITER_VERSION: u16 = 0x3004;
/// Version words that open the appointment section.
pub const READER_VERSION2: u32 = 0x3006;
pub const WRITER_VERSION2: u32 = 0x3009;
/// Writers at or above this version emit a change-highlight block per
/// exception in the extended section.
pub const CHANGE_HIGHLIGHT_MIN_WRITER_VERSION: u32 = 0x3009;

/// High byte added to frequency and end-type codes on write.
pub const CODE_BASE: u32 = 0x2000;
/// Alternate "never ends" end-type code.
pub const END_TYPE_NEVER_ALT: u32 = 0xFFFF_FFFF;

/// 999 days in minutes.
pub const MAX_DAILY_PERIOD_MINUTES: u32 = 1_438_560;
/// Weekly and monthly period cap.
pub const MAX_PERIOD: u32 = 99;

/// The appointment section is only present with at least this much left.
const APPOINTMENT_SECTION_MIN: usize = 16;
/// The extended section is only present with at least this much left.
const EXTENDED_SECTION_MIN: usize = 16;

/// Outcome of [`decode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Decoded {
    Complete(RecurrencePattern),
    Partial(PartialPattern),
}

/// What a failed decode managed to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialPattern {
    /// `None` when the header itself was rejected.
    pub pattern: Option<RecurrencePattern>,
    #[serde(serialize_with = "serialize_display")]
    pub error: DecodeError,
    /// Offset at which decoding stopped.
    pub offset: usize,
    /// Always `false`; present so serialized output states it explicitly.
    pub valid: bool,
}

fn serialize_display<S: serde::Serializer>(
    err: &DecodeError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(err)
}

impl Decoded {
    pub fn is_valid(&self) -> bool {
        matches!(self, Decoded::Complete(_))
    }

    /// The complete pattern, if decoding finished.
    pub fn pattern(&self) -> Option<&RecurrencePattern> {
        match self {
            Decoded::Complete(p) => Some(p),
            Decoded::Partial(_) => None,
        }
    }

    /// Promote a partial decode to an error.
    pub fn into_result(self) -> std::result::Result<RecurrencePattern, RecurrenceError> {
        match self {
            Decoded::Complete(p) => Ok(p),
            Decoded::Partial(partial) => Err(RecurrenceError::Decode(partial.error)),
        }
    }
}

/// Decode a recurrence pattern blob.
#[tracing::instrument(skip(bytes), fields(len = bytes.len()))]
pub fn decode(bytes: &[u8]) -> Decoded {
    let mut reader = ByteReader::new(bytes);

    let mut pattern = match read_header(&mut reader) {
        Ok(p) => p,
        Err(error) => return partial(None, error, &reader),
    };

    match read_body(&mut reader, &mut pattern) {
        Ok(()) => {
            tracing::debug!(
                frequency = ?pattern.frequency,
                variant = ?pattern.variant,
                deleted = pattern.deleted_occurrences.len(),
                modified = pattern.modified_occurrences.len(),
                "decoded recurrence pattern"
            );
            Decoded::Complete(pattern)
        }
        Err(error) => partial(Some(pattern), error, &reader),
    }
}

fn partial(pattern: Option<RecurrencePattern>, error: DecodeError, reader: &ByteReader<'_>) -> Decoded {
    tracing::warn!(%error, offset = reader.position(), "partial recurrence decode");
    Decoded::Partial(PartialPattern {
        pattern,
        error,
        offset: reader.position(),
        valid: false,
    })
}

fn read_header(r: &mut ByteReader<'_>) -> ReadResult<RecurrencePattern> {
    let reader_version = r.read_u16("reader version")?;
    let writer_version = r.read_u16("writer version")?;
    let frequency_code = r.read_u16("frequency")?;
    let variant_code = r.read_u16("pattern type")?;
    let calendar_code = r.read_u16("calendar type")?;

    if reader_version != READER_VERSION || writer_version != WRITER_VERSION {
        return Err(DecodeError::HeaderInvalid(format!(
            "unsupported version {reader_version:#06x}/{writer_version:#06x}"
        )));
    }

    // Only the low byte identifies the frequency; the 0x20 high byte is not
    // checked.
    let frequency = Frequency::from_code((frequency_code & 0xFF) as u8).ok_or_else(|| {
        DecodeError::HeaderInvalid(format!("unknown frequency {frequency_code:#06x}"))
    })?;
    let variant = PatternVariant::from_code(variant_code)
        .filter(|v| v.allowed_for(frequency))
        .ok_or_else(|| {
            DecodeError::HeaderInvalid(format!(
                "pattern type {variant_code:#06x} not valid for {frequency:?}"
            ))
        })?;
    let calendar_type = CalendarType::from_code(calendar_code).ok_or_else(|| {
        DecodeError::HeaderInvalid(format!("unknown calendar type {calendar_code:#06x}"))
    })?;

    Ok(RecurrencePattern {
        calendar_type,
        ..RecurrencePattern::new(frequency, variant)
    })
}

fn read_body(r: &mut ByteReader<'_>, p: &mut RecurrencePattern) -> ReadResult<()> {
    read_frequency_body(r, p)?;

    // Common trailer.
    let end_code = r.read_u32("end type")?;
    let occurrence_count = r.read_u32("occurrence count")?;
    let _first_day_of_week = r.read_u32("first day of week")?;
    let exception_count = r.read_u32("deleted instance count")? as usize;

    p.occurrence_count = occurrence_count;
    p.terminate = Some(match end_code {
        END_TYPE_NEVER_ALT => Terminate::NoEnd,
        code => match (code & 0xFF) as u8 {
            0x21 => Terminate::ByEndDate,
            0x22 => Terminate::AfterCount(occurrence_count),
            0x23 => Terminate::NoEnd,
            _ => {
                return Err(DecodeError::InvalidField {
                    field: "end type",
                    value: code,
                })
            }
        },
    });

    // Exception tables.
    r.require(exception_count, 4, "exception base dates")?;
    let mut base_dates = Vec::with_capacity(exception_count);
    for _ in 0..exception_count {
        base_dates.push(time::from_pattern_minutes(r.read_u32("exception base date")?));
    }

    let modified_count = r.read_u32("modified instance count")? as usize;
    r.require(modified_count, 4, "modified instance dates")?;
    let mut modified_starts = Vec::with_capacity(modified_count);
    for _ in 0..modified_count {
        modified_starts.push(time::from_pattern_minutes(r.read_u32("modified instance date")?));
    }

    p.range_start_local = Some(time::from_pattern_minutes(r.read_u32("start date")?));
    p.range_end_local = Some(time::from_pattern_minutes(r.read_u32("end date")?));

    if r.remaining() < APPOINTMENT_SECTION_MIN {
        // Task-style pattern: no time of day and no detailed exceptions.
        let classified = exceptions::classify(&base_dates, Vec::new());
        p.deleted_occurrences = classified.deleted;
        return Ok(());
    }

    let _reader_version2 = r.read_u32("reader version 2")?;
    let writer_version2 = r.read_u32("writer version 2")?;
    p.start_offset_minutes = Some(r.read_u32("start time offset")?);
    p.end_offset_minutes = Some(r.read_u32("end time offset")?);

    let detailed_count = r.read_u16("exception count")?;
    let mut detailed = Vec::with_capacity(usize::from(detailed_count));
    for _ in 0..detailed_count {
        detailed.push(read_exception(r)?);
    }

    if detailed.len() != modified_starts.len() {
        tracing::warn!(
            detailed = detailed.len(),
            listed = modified_starts.len(),
            "modified instance table disagrees with exception records"
        );
    }

    let classified = exceptions::classify(&base_dates, detailed);
    p.deleted_occurrences = classified.deleted;
    p.modified_occurrences = classified.modified;

    if r.remaining() < EXTENDED_SECTION_MIN {
        return Ok(());
    }
    read_extended(r, p, writer_version2)
}

fn read_frequency_body(r: &mut ByteReader<'_>, p: &mut RecurrencePattern) -> ReadResult<()> {
    let first_date_time = r.read_u32("first date time")?;
    let period = r.read_u32("period")?;
    let sliding = r.read_u32("sliding flag")? != 0;
    p.every_n = period;
    p.regenerating = sliding;

    match p.frequency {
        Frequency::Daily => {
            if period > MAX_DAILY_PERIOD_MINUTES {
                return Err(DecodeError::InvalidField {
                    field: "daily period",
                    value: period,
                });
            }
            if p.variant == PatternVariant::Week {
                p.weekday_mask = read_weekday_mask(r)?;
            }
        }
        Frequency::Weekly => {
            if period > MAX_PERIOD {
                return Err(DecodeError::InvalidField {
                    field: "weekly period",
                    value: period,
                });
            }
            if !sliding {
                p.weekday_mask = read_weekday_mask(r)?;
            }
        }
        Frequency::Monthly | Frequency::Yearly => {
            if p.frequency == Frequency::Yearly {
                p.month_of_year = first_date_time;
                let valid = if sliding {
                    period > 0 && period % 12 == 0
                } else {
                    period == 12
                };
                if !valid {
                    return Err(DecodeError::InvalidField {
                        field: "yearly period",
                        value: period,
                    });
                }
            } else if period > MAX_PERIOD {
                return Err(DecodeError::InvalidField {
                    field: "monthly period",
                    value: period,
                });
            }

            if p.variant.is_nth() {
                p.weekday_mask = read_weekday_mask(r)?;
                let nth = r.read_u32("nth week")?;
                if !(1..=u32::from(LAST_WEEK)).contains(&nth) {
                    return Err(DecodeError::InvalidField {
                        field: "nth week",
                        value: nth,
                    });
                }
                p.nth_week = nth as u8;
            } else {
                let day = r.read_u32("day of month")?;
                if !(1..=31).contains(&day) {
                    return Err(DecodeError::InvalidField {
                        field: "day of month",
                        value: day,
                    });
                }
                p.month_day = day as u8;
            }
        }
    }
    Ok(())
}

fn read_weekday_mask(r: &mut ByteReader<'_>) -> ReadResult<u8> {
    let mask = r.read_u32("weekday mask")?;
    if mask & 0x7F == 0 || mask > 0x7F {
        return Err(DecodeError::InvalidField {
            field: "weekday mask",
            value: mask,
        });
    }
    Ok(mask as u8)
}

fn read_exception(r: &mut ByteReader<'_>) -> ReadResult<ModifiedOccurrence> {
    let start = r.read_u32("exception start")?;
    let end = r.read_u32("exception end")?;
    let base = r.read_u32("exception original start")?;
    let mask = r.read_u16("exception override flags")?;

    let mut occ = ModifiedOccurrence {
        base_date_local: time::day_start(time::from_pattern_minutes(base)),
        start_local: time::from_pattern_minutes(start),
        end_local: time::from_pattern_minutes(end),
        changed_fields: mask,
        ..ModifiedOccurrence::default()
    };
    fields::read_overrides(r, &mut occ, mask)?;
    tracing::trace!(
        base = occ.base_date_local,
        overrides = ?fields::field_names(mask),
        "read exception record"
    );
    Ok(occ)
}

fn read_extended(
    r: &mut ByteReader<'_>,
    p: &mut RecurrencePattern,
    writer_version2: u32,
) -> ReadResult<()> {
    let reserved = r.read_u32("reserved block 1 size")?;
    r.skip(reserved as usize, "reserved block 1")?;

    for occ in &mut p.modified_occurrences {
        if writer_version2 >= CHANGE_HIGHLIGHT_MIN_WRITER_VERSION {
            // The size covers the 4-byte value that follows it.
            let size = r.read_u32("change highlight size")?;
            r.skip(size as usize, "change highlight")?;
        }

        let reserved = r.read_u32("extended reserved block 1 size")?;
        r.skip(reserved as usize, "extended reserved block 1")?;

        if occ.changed_fields & fields::EXTENDED_TEXT == 0 {
            continue;
        }

        let _start = r.read_u32("extended start")?;
        let _end = r.read_u32("extended end")?;
        let _original = r.read_u32("extended original start")?;
        if occ.changed_fields & fields::SUBJECT != 0 {
            occ.subject = Some(fields::read_wide_text(r, "extended subject")?);
        }
        if occ.changed_fields & fields::LOCATION != 0 {
            occ.location = Some(fields::read_wide_text(r, "extended location")?);
        }
        let reserved = r.read_u32("extended reserved block 2 size")?;
        r.skip(reserved as usize, "extended reserved block 2")?;
    }

    if r.remaining() >= 4 {
        let reserved = r.read_u32("reserved block 2 size")?;
        r.skip(reserved as usize, "reserved block 2")?;
    }
    Ok(())
}
