//! Optional per-exception override fields.
//!
//! Each modified occurrence carries a 16-bit mask; every set bit is followed,
//! in ascending bit order, by that field's payload. The table below is the
//! single description of the layout and is walked by both the decoder and the
//! encoder.

use crate::error::DecodeError;
use crate::pattern::ModifiedOccurrence;
use crate::wire::{ByteReader, ByteWriter};

type ReadResult<T> = std::result::Result<T, DecodeError>;

pub const SUBJECT: u16 = 0x0001;
/// Attendees changed; payload is reserved.
pub const MEETING_TYPE: u16 = 0x0002;
pub const REMINDER_DELTA: u16 = 0x0004;
pub const REMINDER_SET: u16 = 0x0008;
pub const LOCATION: u16 = 0x0010;
pub const BUSY_STATUS: u16 = 0x0020;
/// Attachments changed; payload is reserved.
pub const ATTACHMENT: u16 = 0x0040;
/// All-day flag.
pub const SUB_TYPE: u16 = 0x0080;
pub const APPT_COLOR: u16 = 0x0100;
/// Body changed; no inline payload.
pub const EXCEPTIONAL_BODY: u16 = 0x0200;

/// Bits whose text is repeated as UTF-16 in the extended section.
pub const EXTENDED_TEXT: u16 = SUBJECT | LOCATION;

/// Payload shape of an override field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// No payload.
    Empty,
    /// A fixed number of bytes.
    Fixed(usize),
    /// Two u16 lengths (`len + 1`, `len`) followed by `len` single-byte chars.
    LegacyText,
}

impl Width {
    /// Bytes that must remain before the payload can be read at all.
    pub fn min_len(self) -> usize {
        match self {
            Width::Empty => 0,
            Width::Fixed(n) => n,
            Width::LegacyText => 4,
        }
    }
}

pub struct OverrideField {
    pub bit: u16,
    pub name: &'static str,
    pub width: Width,
    read: fn(&mut ByteReader<'_>, &mut ModifiedOccurrence) -> ReadResult<()>,
    write: fn(&mut ByteWriter, &ModifiedOccurrence),
}

/// Override fields in wire (ascending bit) order.
pub const OVERRIDE_FIELDS: [OverrideField; 10] = [
    OverrideField {
        bit: SUBJECT,
        name: "subject",
        width: Width::LegacyText,
        read: |r, occ| {
            occ.subject = Some(read_legacy_text(r, "exception subject")?);
            Ok(())
        },
        write: |w, occ| write_legacy_text(w, occ.subject.as_deref().unwrap_or_default()),
    },
    OverrideField {
        bit: MEETING_TYPE,
        name: "meeting_type",
        width: Width::Fixed(4),
        read: |r, _| r.skip(4, "exception meeting type"),
        write: |w, _| w.put_u32(0),
    },
    OverrideField {
        bit: REMINDER_DELTA,
        name: "reminder_delta",
        width: Width::Fixed(4),
        read: |r, occ| {
            occ.reminder_minutes_before = Some(r.read_u32("exception reminder delta")?);
            Ok(())
        },
        write: |w, occ| w.put_u32(occ.reminder_minutes_before.unwrap_or_default()),
    },
    OverrideField {
        bit: REMINDER_SET,
        name: "reminder_set",
        width: Width::Fixed(4),
        read: |r, occ| {
            occ.reminder_enabled = Some(r.read_u32("exception reminder set")? != 0);
            Ok(())
        },
        write: |w, occ| w.put_u32(u32::from(occ.reminder_enabled.unwrap_or_default())),
    },
    OverrideField {
        bit: LOCATION,
        name: "location",
        width: Width::LegacyText,
        read: |r, occ| {
            occ.location = Some(read_legacy_text(r, "exception location")?);
            Ok(())
        },
        write: |w, occ| write_legacy_text(w, occ.location.as_deref().unwrap_or_default()),
    },
    OverrideField {
        bit: BUSY_STATUS,
        name: "busy_status",
        width: Width::Fixed(4),
        read: |r, occ| {
            occ.busy_status = Some(r.read_u32("exception busy status")?);
            Ok(())
        },
        write: |w, occ| w.put_u32(occ.busy_status.unwrap_or_default()),
    },
    OverrideField {
        bit: ATTACHMENT,
        name: "attachment",
        width: Width::Fixed(4),
        read: |r, _| r.skip(4, "exception attachment"),
        write: |w, _| w.put_u32(0),
    },
    OverrideField {
        bit: SUB_TYPE,
        name: "all_day",
        width: Width::Fixed(4),
        read: |r, occ| {
            occ.all_day = Some(r.read_u32("exception all-day flag")? != 0);
            Ok(())
        },
        write: |w, occ| w.put_u32(u32::from(occ.all_day.unwrap_or_default())),
    },
    OverrideField {
        bit: APPT_COLOR,
        name: "color_label",
        width: Width::Fixed(4),
        read: |r, occ| {
            occ.color_label = Some(r.read_u32("exception colour label")?);
            Ok(())
        },
        write: |w, occ| w.put_u32(occ.color_label.unwrap_or_default()),
    },
    OverrideField {
        bit: EXCEPTIONAL_BODY,
        name: "body",
        width: Width::Empty,
        read: |_, _| Ok(()),
        write: |_, _| {},
    },
];

/// Read the payloads selected by `mask` into `occ`.
pub fn read_overrides(
    reader: &mut ByteReader<'_>,
    occ: &mut ModifiedOccurrence,
    mask: u16,
) -> ReadResult<()> {
    for field in OVERRIDE_FIELDS.iter().filter(|f| mask & f.bit != 0) {
        reader.require(1, field.width.min_len(), field.name)?;
        (field.read)(reader, occ)?;
    }
    Ok(())
}

/// Write the payloads selected by `mask` from `occ`.
pub fn write_overrides(writer: &mut ByteWriter, occ: &ModifiedOccurrence, mask: u16) {
    for field in OVERRIDE_FIELDS.iter().filter(|f| mask & f.bit != 0) {
        (field.write)(writer, occ);
    }
}

/// Names of the fields selected by `mask`, for diagnostics.
pub fn field_names(mask: u16) -> Vec<&'static str> {
    OVERRIDE_FIELDS
        .iter()
        .filter(|f| mask & f.bit != 0)
        .map(|f| f.name)
        .collect()
}

fn read_legacy_text(reader: &mut ByteReader<'_>, context: &'static str) -> ReadResult<String> {
    let _with_terminator = reader.read_u16(context)?;
    let len = reader.read_u16(context)?;
    let bytes = reader.take(usize::from(len), context)?;
    Ok(bytes.iter().map(|&b| char::from(b)).collect())
}

fn write_legacy_text(writer: &mut ByteWriter, text: &str) {
    // Single-byte transcoding: code points above U+00FF become '?'.
    let bytes: Vec<u8> = text
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .take(usize::from(u16::MAX - 1))
        .collect();
    let len = bytes.len() as u16;
    writer.put_u16(len + 1);
    writer.put_u16(len);
    writer.put_bytes(&bytes);
}

/// Length-prefixed UTF-16LE text from the extended section.
pub fn read_wide_text(reader: &mut ByteReader<'_>, context: &'static str) -> ReadResult<String> {
    let chars = usize::from(reader.read_u16(context)?);
    let bytes = reader.take(chars * 2, context)?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

pub fn write_wide_text(writer: &mut ByteWriter, text: &str) {
    let units: Vec<u16> = text.encode_utf16().take(usize::from(u16::MAX)).collect();
    writer.put_u16(units.len() as u16);
    for unit in units {
        writer.put_u16(unit);
    }
}
