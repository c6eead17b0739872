//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::store::PropertyTag;

/// Grid steps evaluated per expansion before stopping early. At one step per
/// day this covers roughly 55 years.
pub const DEFAULT_MAX_GRID_STEPS: u32 = 20_000;

/// Bytes requested per read when a blob has to come from a property stream.
pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 4096;

/// Tunables for expansion and property-store access.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use recurrence_engine::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{ "max_grid_steps": 500 }"#).unwrap();
/// assert_eq!(config.max_grid_steps, 500);
/// assert_eq!(config.stream_chunk_size, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_grid_steps: u32,
    pub stream_chunk_size: usize,
    pub properties: PropertyTags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_grid_steps: DEFAULT_MAX_GRID_STEPS,
            stream_chunk_size: DEFAULT_STREAM_CHUNK_SIZE,
            properties: PropertyTags::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Property tags read by [`load_pattern`](crate::load_pattern) and written by
/// [`save_pattern`](crate::save_pattern).
///
/// Defaults are the appointment named-property ids with their binary/boolean
/// property types in the low word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyTags {
    pub recurrence_pattern: PropertyTag,
    pub timezone: PropertyTag,
    pub recurring: PropertyTag,
}

impl Default for PropertyTags {
    fn default() -> Self {
        Self {
            recurrence_pattern: PropertyTag(0x8216_0102),
            timezone: PropertyTag(0x8233_0102),
            recurring: PropertyTag(0x8223_000B),
        }
    }
}
