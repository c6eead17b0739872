//! Tests for pattern blob decoding: header and body validation, the exception
//! tables, the extended text section, and partial results on bad input.

use chrono::{TimeZone, Utc};
use recurrence_engine::pattern::{FRIDAY, MONDAY, WEDNESDAY};
use recurrence_engine::time::to_pattern_minutes;
use recurrence_engine::{
    decode, CalendarType, DecodeError, Decoded, Frequency, PatternVariant, RecurrenceError,
    Terminate,
};

// ---------------------------------------------------------------------------
// Blob builder
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Blob(Vec<u8>);

impl Blob {
    fn u16(mut self, v: u16) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn u32(mut self, v: u32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn date(self, y: i32, m: u32, d: u32, h: u32) -> Self {
        self.u32(to_pattern_minutes(at(y, m, d, h)))
    }

    fn legacy_text(mut self, text: &str) -> Self {
        self = self.u16(text.len() as u16 + 1).u16(text.len() as u16);
        self.0.extend_from_slice(text.as_bytes());
        self
    }

    fn wide_text(mut self, text: &str) -> Self {
        let units: Vec<u16> = text.encode_utf16().collect();
        self = self.u16(units.len() as u16);
        for unit in units {
            self = self.u16(unit);
        }
        self
    }

    fn header(self, frequency: u16, variant: u16) -> Self {
        self.u16(0x3004).u16(0x3004).u16(frequency).u16(variant).u16(0)
    }

    fn bytes(self) -> Vec<u8> {
        self.0
    }
}

fn at(y: i32, m: u32, d: u32, h: u32) -> i64 {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().timestamp()
}

fn ts(y: i32, m: u32, d: u32) -> i64 {
    at(y, m, d, 0)
}

/// Weekly Mon/Wed/Fri pattern with no exceptions, up to and including the
/// range dates.
fn weekly_head() -> Blob {
    Blob::default()
        .header(0x200B, 0x0001)
        .u32(0) // first date time
        .u32(1) // period
        .u32(0) // sliding
        .u32(u32::from(MONDAY | WEDNESDAY | FRIDAY))
        .u32(0x2021) // end by date
        .u32(10)
        .u32(1) // first day of week
}

fn appointment_tail(blob: Blob) -> Blob {
    blob.u32(0x3006).u32(0x3009).u32(9 * 60).u32(10 * 60)
}

// ===========================================================================
// Well-formed blobs
// ===========================================================================

#[test]
fn weekly_pattern_decodes_completely() {
    let blob = appointment_tail(
        weekly_head()
            .u32(0) // exception count
            .u32(0) // modified count
            .date(2024, 1, 1, 0)
            .date(2024, 3, 29, 0),
    )
    .u16(0) // detailed exceptions
    .u32(0)
    .u32(0)
    .bytes();

    let decoded = decode(&blob);
    assert!(decoded.is_valid());
    let p = decoded.pattern().expect("complete pattern");

    assert_eq!(p.frequency, Frequency::Weekly);
    assert_eq!(p.variant, PatternVariant::Week);
    assert_eq!(p.calendar_type, CalendarType::Default);
    assert_eq!(p.every_n, 1);
    assert!(!p.regenerating);
    assert_eq!(p.weekday_mask, MONDAY | WEDNESDAY | FRIDAY);
    assert_eq!(p.terminate, Some(Terminate::ByEndDate));
    assert_eq!(p.range_start_local, Some(ts(2024, 1, 1)));
    assert_eq!(p.range_end_local, Some(ts(2024, 3, 29)));
    assert_eq!(p.start_offset_minutes, Some(540));
    assert_eq!(p.end_offset_minutes, Some(600));
    assert!(p.deleted_occurrences.is_empty());
    assert!(p.modified_occurrences.is_empty());
}

#[test]
fn frequency_high_byte_is_not_checked() {
    let blob = weekly_head().bytes();
    let mut without_high_byte = blob.clone();
    without_high_byte[4..6].copy_from_slice(&0x000Bu16.to_le_bytes());

    let tail = Blob::default()
        .u32(0)
        .u32(0)
        .date(2024, 1, 1, 0)
        .date(2024, 3, 29, 0)
        .bytes();
    without_high_byte.extend_from_slice(&tail);

    let decoded = decode(&without_high_byte);
    assert!(decoded.is_valid(), "{decoded:?}");
    assert_eq!(decoded.pattern().unwrap().frequency, Frequency::Weekly);
}

#[test]
fn all_ones_end_type_means_no_end() {
    let blob = Blob::default()
        .header(0x200A, 0x0000)
        .u32(0)
        .u32(1440)
        .u32(0)
        .u32(0xFFFF_FFFF)
        .u32(10)
        .u32(1)
        .u32(0)
        .u32(0)
        .date(2024, 1, 1, 0)
        .u32(0x5AE9_80DF)
        .bytes();

    let p = decode(&blob).into_result().expect("valid pattern");
    assert_eq!(p.terminate, Some(Terminate::NoEnd));
}

#[test]
fn after_count_end_type_carries_occurrence_count() {
    let blob = Blob::default()
        .header(0x200A, 0x0000)
        .u32(0)
        .u32(1440)
        .u32(0)
        .u32(0x2022)
        .u32(3)
        .u32(1)
        .u32(0)
        .u32(0)
        .date(2024, 1, 1, 0)
        .date(2024, 1, 3, 0)
        .bytes();

    let p = decode(&blob).into_result().unwrap();
    assert_eq!(p.terminate, Some(Terminate::AfterCount(3)));
    assert_eq!(p.occurrence_count, 3);
}

#[test]
fn task_pattern_stops_after_range_dates() {
    let blob = weekly_head()
        .u32(1)
        .date(2024, 1, 3, 0)
        .u32(0)
        .date(2024, 1, 1, 0)
        .date(2024, 3, 29, 0)
        .bytes();

    let p = decode(&blob).into_result().unwrap();
    assert_eq!(p.start_offset_minutes, None);
    assert_eq!(p.end_offset_minutes, None);
    assert!(p.deleted_occurrences.contains(&ts(2024, 1, 3)));
}

#[test]
fn monthly_nth_and_yearly_bodies() {
    let monthly = Blob::default()
        .header(0x200C, 0x0003)
        .u32(0)
        .u32(1)
        .u32(0)
        .u32(u32::from(FRIDAY))
        .u32(5)
        .u32(0x2023)
        .u32(10)
        .u32(1)
        .u32(0)
        .u32(0)
        .date(2024, 3, 29, 0)
        .u32(0x5AE9_80DF)
        .bytes();
    let p = decode(&monthly).into_result().unwrap();
    assert_eq!(p.variant, PatternVariant::MonthNth);
    assert_eq!(p.weekday_mask, FRIDAY);
    assert_eq!(p.nth_week, 5);

    let yearly = Blob::default()
        .header(0x200D, 0x0002)
        .u32(31 * 1440) // February
        .u32(12)
        .u32(0)
        .u32(29)
        .u32(0x2023)
        .u32(10)
        .u32(1)
        .u32(0)
        .u32(0)
        .date(2024, 2, 29, 0)
        .u32(0x5AE9_80DF)
        .bytes();
    let p = decode(&yearly).into_result().unwrap();
    assert_eq!(p.frequency, Frequency::Yearly);
    assert_eq!(p.month_of_year, 31 * 1440);
    assert_eq!(p.month_day, 29);
}

// ===========================================================================
// Exceptions
// ===========================================================================

#[test]
fn exceptions_split_into_deleted_and_modified() {
    let blob = appointment_tail(
        weekly_head()
            .u32(2)
            .date(2024, 1, 3, 0) // deleted
            .date(2024, 1, 5, 0) // modified
            .u32(1)
            .date(2024, 1, 6, 0)
            .date(2024, 1, 1, 0)
            .date(2024, 3, 29, 0),
    )
    .u16(1)
    .date(2024, 1, 6, 11)
    .date(2024, 1, 6, 12)
    .date(2024, 1, 5, 9)
    .u16(0x0001 | 0x0008 | 0x0010)
    .legacy_text("Lunch")
    .u32(1) // reminder set
    .legacy_text("Cafe")
    .u32(0) // reserved block 1
    .u32(4) // change highlight
    .u32(0)
    .u32(0) // reserved ee1
    .date(2024, 1, 6, 11)
    .date(2024, 1, 6, 12)
    .date(2024, 1, 5, 9)
    .wide_text("Déjeuner")
    .wide_text("Café")
    .u32(0) // reserved ee2
    .u32(0) // reserved block 2
    .bytes();

    let p = decode(&blob).into_result().expect("valid pattern");

    assert_eq!(p.deleted_occurrences.len(), 1);
    assert!(p.deleted_occurrences.contains(&ts(2024, 1, 3)));

    assert_eq!(p.modified_occurrences.len(), 1);
    let m = &p.modified_occurrences[0];
    assert_eq!(m.base_date_local, ts(2024, 1, 5));
    assert_eq!(m.start_local, at(2024, 1, 6, 11));
    assert_eq!(m.end_local, at(2024, 1, 6, 12));
    assert_eq!(m.subject.as_deref(), Some("Déjeuner"));
    assert_eq!(m.location.as_deref(), Some("Café"));
    assert_eq!(m.reminder_enabled, Some(true));
    assert_eq!(m.busy_status, None);
}

#[test]
fn legacy_text_is_kept_without_extended_section() {
    let blob = appointment_tail(
        weekly_head()
            .u32(1)
            .date(2024, 1, 5, 0)
            .u32(1)
            .date(2024, 1, 5, 0)
            .date(2024, 1, 1, 0)
            .date(2024, 3, 29, 0),
    )
    .u16(1)
    .date(2024, 1, 5, 13)
    .date(2024, 1, 5, 14)
    .date(2024, 1, 5, 9)
    .u16(0x0001 | 0x0020 | 0x0100 | 0x0200)
    .legacy_text("Review")
    .u32(3) // busy status
    .u32(7) // colour
    .bytes();

    let p = decode(&blob).into_result().unwrap();
    let m = &p.modified_occurrences[0];
    assert_eq!(m.subject.as_deref(), Some("Review"));
    assert_eq!(m.busy_status, Some(3));
    assert_eq!(m.color_label, Some(7));
    assert_eq!(m.changed_fields & 0x0200, 0x0200);
}

// ===========================================================================
// Partial results
// ===========================================================================

#[test]
fn wrong_version_is_header_invalid_with_no_pattern() {
    let blob = Blob::default()
        .u16(0x3003)
        .u16(0x3004)
        .u16(0x200A)
        .u16(0)
        .u16(0)
        .bytes();

    match decode(&blob) {
        Decoded::Partial(partial) => {
            assert!(partial.pattern.is_none());
            assert!(!partial.valid);
            assert!(matches!(partial.error, DecodeError::HeaderInvalid(_)));
        }
        other => panic!("expected partial decode, got {other:?}"),
    }
}

#[test]
fn variant_not_allowed_for_frequency_is_rejected() {
    // Weekly frequency with a month-day variant.
    let blob = Blob::default().header(0x200B, 0x0002).bytes();
    let decoded = decode(&blob);

    assert!(!decoded.is_valid());
    assert!(matches!(
        decoded.into_result(),
        Err(RecurrenceError::Decode(DecodeError::HeaderInvalid(_)))
    ));
}

#[test]
fn unknown_calendar_type_is_rejected() {
    let blob = Blob::default()
        .u16(0x3004)
        .u16(0x3004)
        .u16(0x200A)
        .u16(0)
        .u16(0x0D)
        .bytes();

    assert!(matches!(
        decode(&blob),
        Decoded::Partial(p) if matches!(p.error, DecodeError::HeaderInvalid(_))
    ));
}

#[test]
fn oversized_exception_count_is_truncated_with_partial_pattern() {
    let blob = weekly_head().u32(1000).date(2024, 1, 3, 0).bytes();

    match decode(&blob) {
        Decoded::Partial(partial) => {
            assert!(matches!(partial.error, DecodeError::Truncated { .. }));
            let p = partial.pattern.expect("header and body were parsed");
            assert_eq!(p.frequency, Frequency::Weekly);
            assert_eq!(p.weekday_mask, MONDAY | WEDNESDAY | FRIDAY);
            assert_eq!(p.terminate, Some(Terminate::ByEndDate));
        }
        other => panic!("expected partial decode, got {other:?}"),
    }
}

#[test]
fn empty_weekday_mask_is_invalid_field() {
    let blob = Blob::default()
        .header(0x200B, 0x0001)
        .u32(0)
        .u32(1)
        .u32(0)
        .u32(0)
        .bytes();

    assert!(matches!(
        decode(&blob),
        Decoded::Partial(p) if p.error == DecodeError::InvalidField { field: "weekday mask", value: 0 }
    ));
}

#[test]
fn yearly_period_must_be_twelve_unless_sliding() {
    let blob = Blob::default()
        .header(0x200D, 0x0002)
        .u32(0)
        .u32(24)
        .u32(0)
        .u32(1)
        .bytes();

    assert!(matches!(
        decode(&blob),
        Decoded::Partial(p) if matches!(p.error, DecodeError::InvalidField { field: "yearly period", .. })
    ));
}

#[test]
fn nth_week_above_five_is_rejected() {
    let blob = Blob::default()
        .header(0x200C, 0x0003)
        .u32(0)
        .u32(1)
        .u32(0)
        .u32(u32::from(FRIDAY))
        .u32(6)
        .bytes();

    assert!(!decode(&blob).is_valid());
}

#[test]
fn unknown_end_type_is_rejected() {
    let blob = Blob::default()
        .header(0x200A, 0x0000)
        .u32(0)
        .u32(1440)
        .u32(0)
        .u32(0x2024)
        .bytes();

    assert!(matches!(
        decode(&blob),
        Decoded::Partial(p) if matches!(p.error, DecodeError::InvalidField { field: "end type", .. })
    ));
}

#[test]
fn truncated_exception_record_keeps_offset() {
    let blob = appointment_tail(
        weekly_head()
            .u32(0)
            .u32(0)
            .date(2024, 1, 1, 0)
            .date(2024, 3, 29, 0),
    )
    .u16(1)
    .date(2024, 1, 5, 13)
    .bytes();

    match decode(&blob) {
        Decoded::Partial(partial) => {
            assert!(matches!(partial.error, DecodeError::Truncated { .. }));
            assert_eq!(partial.offset, blob.len());
        }
        other => panic!("expected partial decode, got {other:?}"),
    }
}

#[test]
fn short_override_payload_names_the_field() {
    let blob = appointment_tail(
        weekly_head()
            .u32(1)
            .date(2024, 1, 5, 0)
            .u32(1)
            .date(2024, 1, 5, 0)
            .date(2024, 1, 1, 0)
            .date(2024, 3, 29, 0),
    )
    .u16(1)
    .date(2024, 1, 5, 13)
    .date(2024, 1, 5, 14)
    .date(2024, 1, 5, 9)
    .u16(0x0020) // busy status, 4 bytes expected
    .u16(3)
    .bytes();

    match decode(&blob) {
        Decoded::Partial(partial) => assert!(matches!(
            partial.error,
            DecodeError::Truncated { context: "busy_status", needed: 4, remaining: 2 }
        )),
        other => panic!("expected partial decode, got {other:?}"),
    }
}

#[test]
fn partial_result_serializes_status_and_validity() {
    let json = serde_json::to_value(decode(&[0x04, 0x30])).unwrap();

    assert_eq!(json["status"], "partial");
    assert_eq!(json["valid"], false);
    assert!(json["error"].as_str().unwrap().contains("truncated"));
}
