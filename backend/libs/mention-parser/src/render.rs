//! Structured mention records and rendering
//!
//! Comment text is stored as plain text plus a list of [`MentionRecord`]s.
//! Views render by interleaving [`Segment`]s instead of rewriting the text.

use crate::{MentionMatch, ResolvedProfile};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use uuid::Uuid;

/// Legacy inline encoding: `@[Display Name](uuid)`
static LEGACY_MARKUP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@\[([^\]\n]{1,100})\]\(([0-9a-fA-F-]{36})\)").expect("Invalid markup regex")
});

/// Mention stored alongside plain text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionRecord {
    pub display_name: String,
    pub user_id: Uuid,
    /// Byte offset of the `@` in the stored text
    pub byte_offset: usize,
}

/// Piece of rendered text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Mention {
        /// `@name` exactly as it appears in the text
        source: &'a str,
        display_name: &'a str,
        user_id: Uuid,
    },
}

/// Build records for matches whose name resolved to a profile
pub fn mention_records(matches: &[MentionMatch], profiles: &[ResolvedProfile]) -> Vec<MentionRecord> {
    let by_name: HashMap<String, &ResolvedProfile> = profiles
        .iter()
        .map(|p| (p.name.to_lowercase(), p))
        .collect();

    matches
        .iter()
        .filter_map(|m| {
            let profile = by_name.get(&m.name.to_lowercase())?;
            Some(MentionRecord {
                display_name: profile.name.clone(),
                user_id: profile.user_id,
                byte_offset: m.index,
            })
        })
        .collect()
}

/// Split text into plain and mention segments
///
/// Records that no longer line up with the text (edited text, bad offsets,
/// overlaps) are rendered as plain text.
pub fn segments<'a>(text: &'a str, records: &'a [MentionRecord]) -> Vec<Segment<'a>> {
    let mut ordered: Vec<&MentionRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.byte_offset);

    let mut out = Vec::new();
    let mut cursor = 0;

    for record in ordered {
        let start = record.byte_offset;
        if start < cursor {
            continue;
        }
        let Some(end) = mention_end(text, record) else {
            continue;
        };

        if start > cursor {
            out.push(Segment::Text(&text[cursor..start]));
        }
        out.push(Segment::Mention {
            source: &text[start..end],
            display_name: &record.display_name,
            user_id: record.user_id,
        });
        cursor = end;
    }

    if cursor < text.len() {
        out.push(Segment::Text(&text[cursor..]));
    }
    out
}

/// Convert legacy `@[Name](uuid)` text into plain text plus records
pub fn decode_legacy_markup(text: &str) -> (String, Vec<MentionRecord>) {
    let mut plain = String::with_capacity(text.len());
    let mut records = Vec::new();
    let mut last = 0;

    for caps in LEGACY_MARKUP_REGEX.captures_iter(text) {
        let (Some(whole), Some(name), Some(id)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let Ok(user_id) = Uuid::parse_str(id.as_str()) else {
            continue;
        };

        plain.push_str(&text[last..whole.start()]);
        records.push(MentionRecord {
            display_name: name.as_str().to_string(),
            user_id,
            byte_offset: plain.len(),
        });
        plain.push('@');
        plain.push_str(name.as_str());
        last = whole.end();
    }
    plain.push_str(&text[last..]);

    (plain, records)
}

/// End offset of `@display_name` at the record's offset, compared case-insensitively
fn mention_end(text: &str, record: &MentionRecord) -> Option<usize> {
    let rest = text.get(record.byte_offset..)?;
    let after_at = rest.strip_prefix('@')?;

    let wanted = record.display_name.chars().count();
    let mut taken = 0;
    let mut len = 0;
    for c in after_at.chars().take(wanted) {
        taken += 1;
        len += c.len_utf8();
    }
    if taken != wanted {
        return None;
    }

    let written = &after_at[..len];
    if written.to_lowercase() != record.display_name.to_lowercase() {
        return None;
    }
    Some(record.byte_offset + 1 + len)
}
