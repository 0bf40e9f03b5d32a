//! Mention parser
//!
//! Extracts `@name` references from free text and resolves them to user ids:
//! - Candidate matching against a known display-name set (cached patterns)
//! - Generic `@token` extraction for lookups by username
//! - Batched resolution through a single `name IN (...)` lookup
//! - Structured mention records and segment rendering
//!
//! Offsets are byte offsets into the UTF-8 source text.

mod error;
mod extract;
mod resolve;

pub mod render;

pub use error::{MentionError, MentionResult};
pub use extract::{
    extract_mention_tokens, extract_mentions, MentionMatch, MentionPatternCache,
    DEFAULT_PATTERN_CACHE_CAPACITY,
};
pub use render::{decode_legacy_markup, mention_records, segments, MentionRecord, Segment};
pub use resolve::{resolve_mentions_to_ids, resolve_profiles, ProfileLookup, ResolvedProfile};
