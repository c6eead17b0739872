//! Tests for pattern blob encoding: required fields, value ranges, the wire
//! layout of the header and trailer, and range anchoring.

use chrono::{TimeZone, Utc};
use recurrence_engine::pattern::{FRIDAY, MONDAY, WEDNESDAY};
use recurrence_engine::time::{self, to_pattern_minutes, NO_END_PATTERN_MINUTES};
use recurrence_engine::{
    decode, encode, resolve_range, ModifiedOccurrence, RecurrenceError, RecurrencePattern,
    Terminate,
};

fn ts(y: i32, m: u32, d: u32) -> i64 {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap().timestamp()
}

fn u16_at(blob: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([blob[offset], blob[offset + 1]])
}

fn u32_at(blob: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(blob[offset..offset + 4].try_into().unwrap())
}

fn mon_wed_fri() -> RecurrencePattern {
    RecurrencePattern::weekly(1, MONDAY | WEDNESDAY | FRIDAY)
        .starting(ts(2024, 1, 1))
        .at(9 * 60, 10 * 60)
        .until(ts(2024, 3, 29))
}

// ===========================================================================
// Required fields
// ===========================================================================

#[test]
fn missing_terminate_is_an_error() {
    let pattern = RecurrencePattern::daily(1440)
        .starting(ts(2024, 1, 1))
        .at(540, 600);

    assert!(matches!(
        encode(&pattern),
        Err(RecurrenceError::MissingRequiredField("terminate"))
    ));
}

#[test]
fn missing_start_is_an_error() {
    let pattern = RecurrencePattern::daily(1440)
        .at(540, 600)
        .ending(Terminate::NoEnd);

    assert!(matches!(
        encode(&pattern),
        Err(RecurrenceError::MissingRequiredField("range_start_local"))
    ));
}

#[test]
fn missing_end_of_date_terminated_pattern_is_an_error() {
    let pattern = RecurrencePattern::daily(1440)
        .starting(ts(2024, 1, 1))
        .at(540, 600)
        .ending(Terminate::ByEndDate);

    assert!(matches!(
        encode(&pattern),
        Err(RecurrenceError::MissingRequiredField("range_end_local"))
    ));
}

#[test]
fn missing_time_offsets_are_errors() {
    let mut pattern = mon_wed_fri();
    pattern.start_offset_minutes = None;
    assert!(matches!(
        encode(&pattern),
        Err(RecurrenceError::MissingRequiredField("start_offset_minutes"))
    ));

    let mut pattern = mon_wed_fri();
    pattern.end_offset_minutes = None;
    assert!(matches!(
        encode(&pattern),
        Err(RecurrenceError::MissingRequiredField("end_offset_minutes"))
    ));
}

// ===========================================================================
// Value ranges
// ===========================================================================

#[test]
fn weekly_interval_above_99_is_out_of_range() {
    let mut pattern = mon_wed_fri();
    pattern.every_n = 100;

    assert!(matches!(
        encode(&pattern),
        Err(RecurrenceError::OutOfRange { field: "every_n", value: 100 })
    ));
}

#[test]
fn yearly_interval_must_be_twelve_unless_sliding() {
    let mut pattern = RecurrencePattern::yearly(6, 1)
        .starting(ts(2024, 1, 1))
        .at(0, 60)
        .ending(Terminate::NoEnd);
    pattern.every_n = 24;
    assert!(encode(&pattern).is_err());

    let sliding = pattern.sliding();
    assert!(encode(&sliding).is_ok());
}

#[test]
fn weekly_without_weekdays_is_out_of_range() {
    let pattern = RecurrencePattern::weekly(1, 0)
        .starting(ts(2024, 1, 1))
        .at(540, 600)
        .ending(Terminate::NoEnd);

    assert!(matches!(
        encode(&pattern),
        Err(RecurrenceError::OutOfRange { field: "weekday_mask", .. })
    ));
}

// ===========================================================================
// Layout
// ===========================================================================

#[test]
fn header_and_trailer_layout() {
    let blob = encode(&mon_wed_fri()).expect("should encode");

    assert_eq!(u16_at(&blob, 0), 0x3004);
    assert_eq!(u16_at(&blob, 2), 0x3004);
    assert_eq!(u16_at(&blob, 4), 0x200B);
    assert_eq!(u16_at(&blob, 6), 0x0001);
    assert_eq!(u16_at(&blob, 8), 0);

    assert_eq!(u32_at(&blob, 14), 1, "period");
    assert_eq!(u32_at(&blob, 18), 0, "sliding flag");
    assert_eq!(u32_at(&blob, 22), u32::from(MONDAY | WEDNESDAY | FRIDAY));
    assert_eq!(u32_at(&blob, 26), 0x2021, "end type");
    assert_eq!(u32_at(&blob, 34), 1, "first day of week");
    assert_eq!(u32_at(&blob, 38), 0, "exception count");
    assert_eq!(u32_at(&blob, 42), 0, "modified count");
    assert_eq!(u32_at(&blob, 46), to_pattern_minutes(ts(2024, 1, 1)));
    assert_eq!(u32_at(&blob, 50), to_pattern_minutes(ts(2024, 3, 29)));
    assert_eq!(u32_at(&blob, 54), 0x3006);
    assert_eq!(u32_at(&blob, 58), 0x3009);
    assert_eq!(u32_at(&blob, 62), 540);
    assert_eq!(u32_at(&blob, 66), 600);
    assert_eq!(u16_at(&blob, 70), 0, "detailed exception count");
}

#[test]
fn exception_tables_are_sorted() {
    let mut pattern = mon_wed_fri();
    pattern.modify_occurrence(ModifiedOccurrence::moved(
        ts(2024, 1, 12),
        ts(2024, 1, 13) + 3600,
        ts(2024, 1, 13) + 7200,
    ));
    pattern.delete_occurrence(ts(2024, 1, 10));
    pattern.modify_occurrence(ModifiedOccurrence::moved(
        ts(2024, 1, 3),
        ts(2024, 1, 4) + 3600,
        ts(2024, 1, 4) + 7200,
    ));

    let blob = encode(&pattern).unwrap();
    assert_eq!(u32_at(&blob, 38), 3);
    let base_dates: Vec<u32> = (0..3).map(|i| u32_at(&blob, 42 + 4 * i)).collect();
    assert_eq!(
        base_dates,
        vec![
            to_pattern_minutes(ts(2024, 1, 3)),
            to_pattern_minutes(ts(2024, 1, 10)),
            to_pattern_minutes(ts(2024, 1, 12)),
        ]
    );

    assert_eq!(u32_at(&blob, 54), 2);
    assert_eq!(u32_at(&blob, 58), to_pattern_minutes(ts(2024, 1, 4)));
    assert_eq!(u32_at(&blob, 62), to_pattern_minutes(ts(2024, 1, 13)));
}

#[test]
fn extended_text_round_trips_non_latin_subject() {
    let mut pattern = mon_wed_fri();
    pattern.modify_occurrence(ModifiedOccurrence {
        subject: Some("週次ミーティング".into()),
        location: Some("Zürich".into()),
        ..ModifiedOccurrence::moved(ts(2024, 1, 8), ts(2024, 1, 8) + 3600, ts(2024, 1, 8) + 7200)
    });

    let decoded = decode(&encode(&pattern).unwrap()).into_result().unwrap();
    let m = &decoded.modified_occurrences[0];

    assert_eq!(m.subject.as_deref(), Some("週次ミーティング"));
    assert_eq!(m.location.as_deref(), Some("Zürich"));
}

// ===========================================================================
// Anchoring
// ===========================================================================

#[test]
fn start_is_anchored_on_first_selected_day() {
    // Sunday start; the first selected day is Monday.
    let pattern = RecurrencePattern::weekly(1, MONDAY | WEDNESDAY | FRIDAY)
        .starting(ts(2023, 12, 31))
        .at(540, 600)
        .ending(Terminate::NoEnd);

    let (start, end) = resolve_range(&pattern).unwrap();
    assert_eq!(start, ts(2024, 1, 1));
    assert_eq!(end, time::from_pattern_minutes(NO_END_PATTERN_MINUTES));

    let blob = encode(&pattern).unwrap();
    assert_eq!(u32_at(&blob, 50), NO_END_PATTERN_MINUTES);
    assert_eq!(u32_at(&blob, 26), 0x2023);
}

#[test]
fn monthly_start_after_target_day_moves_to_next_month() {
    let pattern = RecurrencePattern::monthly(1, 10)
        .starting(ts(2024, 1, 15))
        .at(540, 600)
        .ending(Terminate::NoEnd);

    let (start, _) = resolve_range(&pattern).unwrap();
    assert_eq!(start, ts(2024, 2, 10));
}

#[test]
fn monthly_day_31_anchors_on_capped_day() {
    let pattern = RecurrencePattern::monthly(1, 31)
        .starting(ts(2024, 4, 15))
        .at(540, 600)
        .ending(Terminate::NoEnd);

    let (start, _) = resolve_range(&pattern).unwrap();
    assert_eq!(start, ts(2024, 4, 30));
}

#[test]
fn end_date_before_anchored_start_is_out_of_range() {
    let pattern = RecurrencePattern::monthly(1, 31)
        .starting(ts(2024, 4, 15))
        .at(540, 600)
        .until(ts(2024, 4, 20));

    assert!(matches!(
        encode(&pattern),
        Err(RecurrenceError::OutOfRange { field: "range_end_local", .. })
    ));

    let same_day = pattern.clone().until(ts(2024, 4, 30));
    let (start, end) = resolve_range(&same_day).unwrap();
    assert_eq!((start, end), (ts(2024, 4, 30), ts(2024, 4, 30)));
}

#[test]
fn after_count_end_is_last_counted_occurrence() {
    let pattern = RecurrencePattern::weekly(1, MONDAY | WEDNESDAY | FRIDAY)
        .starting(ts(2024, 1, 1))
        .at(540, 600)
        .ending(Terminate::AfterCount(5));

    let (start, end) = resolve_range(&pattern).unwrap();
    assert_eq!(start, ts(2024, 1, 1));
    assert_eq!(end, ts(2024, 1, 10));

    let blob = encode(&pattern).unwrap();
    assert_eq!(u32_at(&blob, 26), 0x2022);
    assert_eq!(u32_at(&blob, 30), 5);
}

#[test]
fn changing_start_recomputes_count_terminated_end() {
    let mut pattern = RecurrencePattern::daily(1440)
        .starting(ts(2024, 1, 1))
        .at(540, 600)
        .ending(Terminate::AfterCount(3));
    let decoded = decode(&encode(&pattern).unwrap()).into_result().unwrap();
    assert_eq!(decoded.range_end_local, Some(ts(2024, 1, 3)));

    pattern.set_range_start(ts(2024, 2, 1));
    assert_eq!(pattern.range_end_local, None);
    let decoded = decode(&encode(&pattern).unwrap()).into_result().unwrap();
    assert_eq!(decoded.range_end_local, Some(ts(2024, 2, 3)));
}

#[test]
fn monthly_first_date_time_is_month_offset_modulo_period() {
    // 2024-01 is month 5076 since 1601-01; 5076 % 3 == 0, so the field is 0.
    let pattern = RecurrencePattern::monthly(3, 1)
        .starting(ts(2024, 1, 1))
        .at(540, 600)
        .ending(Terminate::NoEnd);
    let blob = encode(&pattern).unwrap();
    assert_eq!(u32_at(&blob, 10), 0);

    // 2024-02 is one month further: 31 days after 1601-01-01.
    let pattern = RecurrencePattern::monthly(3, 1)
        .starting(ts(2024, 2, 1))
        .at(540, 600)
        .ending(Terminate::NoEnd);
    let blob = encode(&pattern).unwrap();
    assert_eq!(u32_at(&blob, 10), 31 * 1440);
}
