//! Error types for recurrence-engine operations.

use thiserror::Error;

/// Why a pattern blob could not be decoded in full.
///
/// Decoding is tolerant: these are carried inside
/// [`Decoded::Partial`](crate::decoder::Decoded::Partial) next to whatever
/// was parsed before the failure point, never returned on their own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Bad version words or an unknown frequency/variant/calendar code.
    #[error("invalid pattern header: {0}")]
    HeaderInvalid(String),

    /// A declared field or count runs past the end of the blob.
    #[error("pattern truncated while reading {context}: needed {needed} bytes, {remaining} left")]
    Truncated {
        context: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// A body field holds a value outside the range the frequency allows.
    #[error("invalid value {value:#x} for {field}")]
    InvalidField { field: &'static str, value: u32 },
}

/// Hard failures surfaced to callers.
#[derive(Error, Debug)]
pub enum RecurrenceError {
    /// A decode that stopped early, promoted to an error by the caller.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Encoding was asked for a pattern without one of its required fields.
    #[error("cannot encode pattern: required field `{0}` is unset")]
    MissingRequiredField(&'static str),

    /// A pattern field lies outside what the wire format can carry.
    #[error("cannot encode pattern: {field} = {value} is out of range")]
    OutOfRange { field: &'static str, value: i64 },

    /// The property stream ran dry before the declared length was read.
    #[error("property stream ended after {received} of {expected} bytes")]
    StreamIncomplete { expected: u64, received: u64 },

    /// Checked date conversion left the range of the 32-bit pattern unit.
    #[error("date {0} is outside the representable pattern range")]
    DateOverflow(i64),

    /// The timezone blob is shorter than its fixed layout.
    #[error("timezone blob is {0} bytes, expected at least 48")]
    InvalidTimezoneBlob(usize),

    /// The pattern has no RFC 5545 equivalent.
    #[error("pattern cannot be written as an RRULE: {0}")]
    NotExpressible(&'static str),

    /// The property-store collaborator failed.
    #[error("property store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, RecurrenceError>;
