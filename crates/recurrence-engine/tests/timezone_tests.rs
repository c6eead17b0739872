//! Tests for the DST rule blob and offset resolution.
//!
//! Zone rules here are checked against `chrono-tz` only on dates well away
//! from transitions: the blob's "week N" counts 7-day blocks rather than
//! weekday occurrences, so the transition days themselves legitimately differ.

use chrono::{NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::{America::New_York, Europe::Berlin, Tz};
use recurrence_engine::timezone::{local_day_of, TIMEZONE_BLOB_LEN};
use recurrence_engine::{DstTransition, RecurrenceError, TimezoneRule};

fn local(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> i64 {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap().timestamp()
}

fn berlin() -> TimezoneRule {
    TimezoneRule::with_dst(
        -60,
        -60,
        DstTransition::new(3, 5, 2),
        DstTransition::new(10, 5, 3),
    )
}

fn new_york() -> TimezoneRule {
    TimezoneRule::with_dst(
        300,
        -60,
        DstTransition::new(3, 2, 2),
        DstTransition::new(11, 1, 2),
    )
}

fn sydney() -> TimezoneRule {
    TimezoneRule::with_dst(
        -600,
        -60,
        DstTransition::new(10, 1, 2),
        DstTransition::new(4, 1, 3),
    )
}

fn u16_at(blob: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([blob[offset], blob[offset + 1]])
}

fn i32_at(blob: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(blob[offset..offset + 4].try_into().unwrap())
}

// ===========================================================================
// Blob layout
// ===========================================================================

#[test]
fn blob_layout() {
    let blob = new_york().encode();

    assert_eq!(blob.len(), TIMEZONE_BLOB_LEN);
    assert_eq!(i32_at(&blob, 0), 300);
    assert_eq!(i32_at(&blob, 8), -60);
    assert_eq!(u16_at(&blob, 16), 11, "end month");
    assert_eq!(u16_at(&blob, 20), 1, "end week");
    assert_eq!(u16_at(&blob, 22), 2, "end hour");
    assert_eq!(u16_at(&blob, 34), 3, "start month");
    assert_eq!(u16_at(&blob, 38), 2, "start week");
    assert_eq!(u16_at(&blob, 40), 2, "start hour");
}

#[test]
fn blob_round_trips() {
    for rule in [TimezoneRule::utc(), TimezoneRule::fixed(-330), berlin(), sydney()] {
        let decoded = TimezoneRule::decode(&rule.encode()).expect("should decode");
        assert_eq!(decoded, rule);
    }
}

#[test]
fn reserved_bytes_are_ignored() {
    let mut blob = berlin().encode();
    blob[4] = 0xAA;
    blob[26] = 0xBB;
    blob[46] = 0xCC;

    assert_eq!(TimezoneRule::decode(&blob).unwrap(), berlin());
}

#[test]
fn short_blob_is_rejected() {
    let blob = berlin().encode();

    assert!(matches!(
        TimezoneRule::decode(&blob[..47]),
        Err(RecurrenceError::InvalidTimezoneBlob(47))
    ));
    assert!(TimezoneRule::decode(&[]).is_err());
}

#[test]
fn zero_month_disables_dst() {
    let rule = TimezoneRule::with_dst(
        -60,
        -60,
        DstTransition::new(0, 5, 2),
        DstTransition::new(10, 5, 3),
    );

    assert!(!rule.has_dst());
    assert_eq!(rule.resolve_offset_minutes(local(2024, 7, 1, 12, 0, 0)), -60);
}

// ===========================================================================
// Transitions
// ===========================================================================

#[test]
fn boundaries_are_exclusive() {
    let rule = new_york();
    // Week 2 of March 2024 starts on the 8th.
    let start = local(2024, 3, 8, 2, 0, 0);
    // Week 1 of November starts on the 1st.
    let end = local(2024, 11, 1, 2, 0, 0);

    assert_eq!(rule.resolve_offset_minutes(start), 300);
    assert_eq!(rule.resolve_offset_minutes(start + 1), 240);
    assert_eq!(rule.resolve_offset_minutes(end - 1), 240);
    assert_eq!(rule.resolve_offset_minutes(end), 300);
}

#[test]
fn week_five_backs_up_in_short_months() {
    let rule = TimezoneRule::with_dst(
        0,
        -60,
        DstTransition::new(2, 5, 0),
        DstTransition::new(11, 1, 0),
    );

    // 2023 has no 29 February: week 5 starts on the 22nd.
    assert_eq!(rule.resolve_offset_minutes(local(2023, 2, 21, 12, 0, 0)), 0);
    assert_eq!(rule.resolve_offset_minutes(local(2023, 2, 22, 0, 0, 1)), -60);

    // 2024 does.
    assert_eq!(rule.resolve_offset_minutes(local(2024, 2, 28, 12, 0, 0)), 0);
    assert_eq!(rule.resolve_offset_minutes(local(2024, 2, 29, 0, 0, 1)), -60);
}

#[test]
fn southern_hemisphere_window_wraps_the_year() {
    let rule = sydney();

    assert_eq!(rule.resolve_offset_minutes(local(2024, 1, 15, 12, 0, 0)), -660);
    assert_eq!(rule.resolve_offset_minutes(local(2024, 12, 20, 12, 0, 0)), -660);
    assert_eq!(rule.resolve_offset_minutes(local(2024, 7, 15, 12, 0, 0)), -600);
}

#[test]
fn conversions_apply_the_bias() {
    let rule = new_york();
    let winter_local = local(2024, 1, 15, 9, 0, 0);
    let summer_local = local(2024, 7, 15, 9, 0, 0);

    assert_eq!(rule.to_utc(winter_local), local(2024, 1, 15, 14, 0, 0));
    assert_eq!(rule.to_utc(summer_local), local(2024, 7, 15, 13, 0, 0));
    assert_eq!(rule.to_local(local(2024, 7, 15, 13, 0, 0)), summer_local);
}

#[test]
fn local_day_follows_the_zone() {
    // 02:00 UTC on 4 July is the evening of 3 July in New York.
    let utc = local(2024, 7, 4, 2, 0, 0);

    assert_eq!(local_day_of(&new_york(), utc), local(2024, 7, 3, 0, 0, 0));
    assert_eq!(local_day_of(&TimezoneRule::utc(), utc), local(2024, 7, 4, 0, 0, 0));
}

// ---------------------------------------------------------------------------
// Cross-check against the IANA database
// ---------------------------------------------------------------------------

fn assert_matches_iana(rule: &TimezoneRule, tz: Tz, dates: &[(i32, u32, u32)]) {
    for &(y, m, d) in dates {
        let naive = NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let utc = naive.and_utc().timestamp();
        let expected = tz.from_utc_datetime(&naive).offset().fix().local_minus_utc();

        assert_eq!(
            rule.to_local(utc) - utc,
            i64::from(expected),
            "offset mismatch on {y}-{m:02}-{d:02}"
        );
    }
}

#[test]
fn berlin_matches_iana_away_from_transitions() {
    let dates = [
        (2024, 1, 15),
        (2024, 3, 15),
        (2024, 4, 15),
        (2024, 7, 1),
        (2024, 10, 15),
        (2024, 11, 15),
        (2025, 6, 21),
        (2025, 12, 24),
    ];
    assert_matches_iana(&berlin(), Berlin, &dates);
}

#[test]
fn new_york_matches_iana_away_from_transitions() {
    let dates = [
        (2024, 1, 15),
        (2024, 2, 28),
        (2024, 4, 1),
        (2024, 7, 4),
        (2024, 10, 15),
        (2024, 12, 20),
        (2025, 8, 1),
    ];
    assert_matches_iana(&new_york(), New_York, &dates);
}
