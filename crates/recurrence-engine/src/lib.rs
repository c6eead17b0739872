//! # recurrence-engine
//!
//! Codec and expander for the binary appointment recurrence pattern.
//!
//! Decodes and encodes the recurrence pattern blob and its 48-byte timezone
//! rule, and expands a pattern into concrete occurrences for any window with
//! deleted and modified occurrences applied. Timezone handling is driven by
//! the rule blob alone; no platform timezone database is consulted.
//!
//! ## Modules
//!
//! - [`decoder`]: pattern blob → [`RecurrencePattern`] (tolerant, partial on failure)
//! - [`encoder`]: [`RecurrencePattern`] → pattern blob, with range anchoring
//! - [`timezone`]: timezone rule blob codec and UTC ⇄ local resolution
//! - [`exceptions`]: split exception records into deleted and modified
//! - [`expander`]: pattern → ordered occurrence instances in a window
//! - [`materializer`]: host hook turning occurrences into host items
//! - [`store`]: property-store boundary: load/save and chunked stream reads
//! - [`rrule`]: export as an RFC 5545 RRULE value
//! - [`config`]: engine tunables
//! - [`error`]: Error types
//!
//! ## Example
//!
//! ```
//! use recurrence_engine::{decode, encode, generate, RecurrencePattern, TimezoneRule};
//! use recurrence_engine::pattern::{MONDAY, WEDNESDAY, FRIDAY};
//!
//! // Mondays, Wednesdays and Fridays, 09:00-10:00, from 2024-01-01.
//! let pattern = RecurrencePattern::weekly(1, MONDAY | WEDNESDAY | FRIDAY)
//!     .starting(1_704_067_200)
//!     .at(9 * 60, 10 * 60)
//!     .until(1_706_659_200);
//!
//! let blob = encode(&pattern).unwrap();
//! let decoded = decode(&blob).into_result().unwrap();
//!
//! let week = generate(&decoded, &TimezoneRule::utc(), 1_704_067_200, 1_704_672_000, 0, false).unwrap();
//! assert_eq!(week.len(), 3);
//! ```

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod exceptions;
pub mod expander;
pub mod fields;
mod grid;
pub mod materializer;
pub mod pattern;
pub mod rrule;
pub mod store;
pub mod time;
pub mod timezone;
pub mod wire;

pub use config::EngineConfig;
pub use decoder::{decode, Decoded, PartialPattern};
pub use encoder::{encode, resolve_range};
pub use error::{DecodeError, RecurrenceError, Result};
pub use exceptions::{classify, Classified};
pub use expander::{
    generate, ExpansionRequest, OccurrenceDetails, OccurrenceExpander, OccurrenceInstance,
};
pub use materializer::{Candidate, Instances, OccurrenceMaterializer};
pub use pattern::{
    CalendarType, Frequency, ModifiedOccurrence, PatternVariant, RecurrencePattern, Terminate,
};
pub use rrule::to_rrule;
pub use store::{
    load_pattern, read_full_blob, save_pattern, LoadedPattern, MemoryStore, PropertyStore,
    PropertyStream, PropertyTag, PropertyValue,
};
pub use timezone::{DstTransition, TimezoneRule};
