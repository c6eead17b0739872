//! Property-store boundary: reading and writing the pattern and timezone
//! blobs on a host calendar item.
//!
//! The host owns persistence. It implements [`PropertyStore`] (and
//! [`PropertyStream`] for values too large for a single read); this module
//! only assembles blobs and hands them to the codecs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::decoder::{self, Decoded};
use crate::encoder;
use crate::error::{RecurrenceError, Result};
use crate::pattern::RecurrencePattern;
use crate::timezone::TimezoneRule;

/// Host-defined property identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyTag(pub u32);

/// Value of a single property as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Binary(Vec<u8>),
    Int(i64),
    Bool(bool),
    /// The value exists but must be read through
    /// [`PropertyStore::open_property_stream`].
    TooLarge,
}

/// Sequential reader over one large property value.
pub trait PropertyStream {
    /// Read up to `max_bytes`. An empty chunk means the stream is exhausted.
    fn read_chunk(&mut self, max_bytes: usize) -> Result<Vec<u8>>;

    /// Declared length of the whole value.
    fn total_length(&self) -> u64;
}

pub trait PropertyStore {
    fn get_property(&self, tag: PropertyTag) -> Result<Option<PropertyValue>>;

    /// Write all values in one operation.
    fn set_properties(&mut self, values: BTreeMap<PropertyTag, PropertyValue>) -> Result<()>;

    fn open_property_stream(&self, tag: PropertyTag) -> Result<Box<dyn PropertyStream + '_>>;
}

/// Read a stream to its declared length in chunks of at most `chunk_size`.
///
/// A short final chunk is fine as long as the total is reached; running dry
/// earlier is [`RecurrenceError::StreamIncomplete`].
pub fn read_full_blob(stream: &mut dyn PropertyStream, chunk_size: usize) -> Result<Vec<u8>> {
    let expected = stream.total_length();
    let chunk_size = chunk_size.max(1);
    let mut blob = Vec::with_capacity(usize::try_from(expected).unwrap_or(0).min(1 << 20));

    while (blob.len() as u64) < expected {
        let wanted = (expected - blob.len() as u64).min(chunk_size as u64) as usize;
        let chunk = stream.read_chunk(wanted)?;
        if chunk.is_empty() {
            return Err(RecurrenceError::StreamIncomplete {
                expected,
                received: blob.len() as u64,
            });
        }
        blob.extend_from_slice(&chunk);
    }
    blob.truncate(usize::try_from(expected).unwrap_or(usize::MAX));
    tracing::debug!(bytes = blob.len(), "assembled blob from property stream");
    Ok(blob)
}

/// A pattern and its timezone rule as stored on an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPattern {
    pub pattern: Decoded,
    /// `None` when the item carries no timezone blob.
    pub timezone: Option<TimezoneRule>,
}

/// Load and decode the recurrence blobs of an item.
///
/// Returns `Ok(None)` for an item with no pattern property. A malformed
/// pattern blob still loads, as [`Decoded::Partial`].
#[tracing::instrument(skip_all)]
pub fn load_pattern(
    store: &dyn PropertyStore,
    config: &EngineConfig,
) -> Result<Option<LoadedPattern>> {
    let tags = config.properties;
    let Some(blob) = read_binary(store, tags.recurrence_pattern, config.stream_chunk_size)? else {
        return Ok(None);
    };
    let pattern = decoder::decode(&blob);

    let timezone = match read_binary(store, tags.timezone, config.stream_chunk_size)? {
        Some(bytes) => Some(TimezoneRule::decode(&bytes)?),
        None => None,
    };

    Ok(Some(LoadedPattern { pattern, timezone }))
}

/// Encode a pattern (and its timezone rule, if any) and write both together
/// with the recurring flag.
///
/// Nothing is written if encoding fails.
#[tracing::instrument(skip_all)]
pub fn save_pattern(
    store: &mut dyn PropertyStore,
    pattern: &RecurrencePattern,
    timezone: Option<&TimezoneRule>,
    config: &EngineConfig,
) -> Result<()> {
    let tags = config.properties;
    let blob = encoder::encode(pattern)?;

    let mut values = BTreeMap::new();
    values.insert(tags.recurrence_pattern, PropertyValue::Binary(blob));
    values.insert(tags.recurring, PropertyValue::Bool(true));
    if let Some(tz) = timezone {
        values.insert(tags.timezone, PropertyValue::Binary(tz.encode()));
    }
    store.set_properties(values)
}

fn read_binary(
    store: &dyn PropertyStore,
    tag: PropertyTag,
    chunk_size: usize,
) -> Result<Option<Vec<u8>>> {
    match store.get_property(tag)? {
        None => Ok(None),
        Some(PropertyValue::Binary(bytes)) => Ok(Some(bytes)),
        Some(PropertyValue::TooLarge) => {
            let mut stream = store.open_property_stream(tag)?;
            read_full_blob(stream.as_mut(), chunk_size).map(Some)
        }
        Some(other) => Err(RecurrenceError::Store(format!(
            "property {:#010x} is not binary: {other:?}",
            tag.0
        ))),
    }
}

/// In-memory [`PropertyStore`].
///
/// Binary values longer than the single-read limit are reported as
/// [`PropertyValue::TooLarge`] and served through a stream, the way a real
/// store behaves for oversized properties.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<PropertyTag, PropertyValue>,
    single_read_limit: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_single_read_limit(mut self, limit: usize) -> Self {
        self.single_read_limit = Some(limit);
        self
    }

    pub fn insert(&mut self, tag: PropertyTag, value: PropertyValue) {
        self.values.insert(tag, value);
    }

    /// The stored value, ignoring the single-read limit.
    pub fn get(&self, tag: PropertyTag) -> Option<&PropertyValue> {
        self.values.get(&tag)
    }
}

impl PropertyStore for MemoryStore {
    fn get_property(&self, tag: PropertyTag) -> Result<Option<PropertyValue>> {
        Ok(self.values.get(&tag).map(|value| match (value, self.single_read_limit) {
            (PropertyValue::Binary(bytes), Some(limit)) if bytes.len() > limit => {
                PropertyValue::TooLarge
            }
            _ => value.clone(),
        }))
    }

    fn set_properties(&mut self, values: BTreeMap<PropertyTag, PropertyValue>) -> Result<()> {
        self.values.extend(values);
        Ok(())
    }

    fn open_property_stream(&self, tag: PropertyTag) -> Result<Box<dyn PropertyStream + '_>> {
        match self.values.get(&tag) {
            Some(PropertyValue::Binary(bytes)) => Ok(Box::new(SliceStream { data: bytes, pos: 0 })),
            Some(_) => Err(RecurrenceError::Store(format!(
                "property {:#010x} cannot be streamed",
                tag.0
            ))),
            None => Err(RecurrenceError::Store(format!(
                "property {:#010x} not found",
                tag.0
            ))),
        }
    }
}

struct SliceStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl PropertyStream for SliceStream<'_> {
    fn read_chunk(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let end = self.data.len().min(self.pos.saturating_add(max_bytes));
        let chunk = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(chunk)
    }

    fn total_length(&self) -> u64 {
        self.data.len() as u64
    }
}
