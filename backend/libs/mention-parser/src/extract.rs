//! Mention extraction
//!
//! Two paths:
//! - [`extract_mentions`] matches `@name` against a candidate name set
//! - [`extract_mention_tokens`] recognizes the generic `@[A-Za-z0-9_]{2,100}` shape
//!
//! Both skip mentions inside email addresses or URLs and mentions whose `@`
//! directly follows a word character (`bob@bob`).

use crate::{MentionError, MentionResult};
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Default number of compiled candidate patterns kept around
pub const DEFAULT_PATTERN_CACHE_CAPACITY: usize = 64;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\w.+-]+@[\w-]+(?:\.[\w-]+)+").expect("Invalid email regex")
});

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"]+"#).expect("Invalid url regex")
});

/// Generic mention token, resolved later by name lookup
static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_]{2,100})").expect("Invalid mention regex"));

static DEFAULT_CACHE: LazyLock<MentionPatternCache> =
    LazyLock::new(|| MentionPatternCache::new(DEFAULT_PATTERN_CACHE_CAPACITY));

/// One `@name` occurrence
///
/// `index` is the byte offset of the `@`, `length` the byte length of `@name`.
/// `name` is the text as written, which may differ in case from the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MentionMatch {
    pub name: String,
    pub index: usize,
    pub length: usize,
}

impl MentionMatch {
    /// Byte range of `@name` in the source text
    pub fn span(&self) -> Range<usize> {
        self.index..self.index + self.length
    }

    /// Candidate spelling of the matched name
    pub fn canonical<'a, S: AsRef<str>>(&self, names: &'a [S]) -> Option<&'a str> {
        let wanted = self.name.to_lowercase();
        names
            .iter()
            .map(|n| n.as_ref().trim())
            .find(|n| n.to_lowercase() == wanted)
    }
}

/// LRU of compiled candidate patterns, keyed by normalized name set
pub struct MentionPatternCache {
    patterns: Mutex<LruCache<String, Arc<Regex>>>,
}

impl MentionPatternCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            patterns: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of compiled patterns currently cached
    pub fn len(&self) -> usize {
        self.patterns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compiled pattern for a name set, built on first use
    ///
    /// Returns `None` when the set holds no usable names.
    pub fn pattern_for<S: AsRef<str>>(&self, names: &[S]) -> MentionResult<Option<Arc<Regex>>> {
        let normalized = normalize_names(names);
        if normalized.is_empty() {
            return Ok(None);
        }

        let key = normalized.join("\u{1f}");
        let mut patterns = self.patterns.lock();
        if let Some(pattern) = patterns.get(&key) {
            return Ok(Some(Arc::clone(pattern)));
        }

        let pattern = Arc::new(build_candidate_pattern(&normalized)?);
        patterns.put(key, Arc::clone(&pattern));
        debug!(names = normalized.len(), "Compiled mention pattern");
        Ok(Some(pattern))
    }

    /// Mentions of any candidate name, ordered by position
    pub fn extract<S: AsRef<str>>(
        &self,
        text: &str,
        names: &[S],
    ) -> MentionResult<Vec<MentionMatch>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        match self.pattern_for(names)? {
            Some(pattern) => Ok(scan_candidates(&pattern, text)),
            None => Ok(Vec::new()),
        }
    }
}

impl Default for MentionPatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_CACHE_CAPACITY)
    }
}

/// Extract mentions of candidate names using the process-wide pattern cache
///
/// # Examples
/// ```
/// use mention_parser::extract_mentions;
///
/// let found = extract_mentions("Hi @Alice! mail bob@alice.com", &["Alice"]);
/// assert_eq!(found.len(), 1);
/// assert_eq!(found[0].index, 3);
/// ```
pub fn extract_mentions<S: AsRef<str>>(text: &str, names: &[S]) -> Vec<MentionMatch> {
    match DEFAULT_CACHE.extract(text, names) {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, "Mention pattern could not be built");
            Vec::new()
        }
    }
}

/// Extract unique `@token` names, in first-occurrence order
///
/// # Examples
/// ```
/// use mention_parser::extract_mention_tokens;
///
/// let names = extract_mention_tokens("@jane and @max_1, cc @jane");
/// assert_eq!(names, vec!["jane", "max_1"]);
/// ```
pub fn extract_mention_tokens(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let masked = masked_spans(text);
    let mut seen = HashSet::new();

    TOKEN_REGEX
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            let span = whole.start()..name.end();
            if preceded_by_word_char(text, whole.start()) || is_masked(&masked, &span) {
                return None;
            }
            Some(name.as_str().to_string())
        })
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

fn scan_candidates(pattern: &Regex, text: &str) -> Vec<MentionMatch> {
    let masked = masked_spans(text);
    let mut found: BTreeMap<(usize, usize), MentionMatch> = BTreeMap::new();
    let mut pos = 0;

    while pos < text.len() {
        let Some(caps) = pattern.captures_at(text, pos) else {
            break;
        };
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };

        let at = whole.start();
        let span = at..name.end();
        if preceded_by_word_char(text, at) || is_masked(&masked, &span) {
            pos = at + 1;
            continue;
        }

        found
            .entry((span.start, span.len()))
            .or_insert_with(|| MentionMatch {
                name: name.as_str().to_string(),
                index: span.start,
                length: span.len(),
            });
        // Resume after the name, not after the consumed boundary character
        pos = name.end();
    }

    found.into_values().collect()
}

/// Trimmed, lowercased, deduplicated names; longest first so `Anna` wins over `Ann`
fn normalize_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut normalized: Vec<String> = names
        .iter()
        .map(|n| n.as_ref().trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect();
    normalized.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });
    normalized.dedup();
    normalized
}

fn build_candidate_pattern(names: &[String]) -> Result<Regex, MentionError> {
    let alternation = names
        .iter()
        .map(|n| regex::escape(n))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = Regex::new(&format!(
        r"(?i)@({alternation})(?:$|[^\p{{L}}\p{{N}}_])"
    ))?;
    Ok(pattern)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn preceded_by_word_char(text: &str, at: usize) -> bool {
    text[..at].chars().next_back().is_some_and(is_word_char)
}

fn masked_spans(text: &str) -> Vec<Range<usize>> {
    EMAIL_REGEX
        .find_iter(text)
        .chain(URL_REGEX.find_iter(text))
        .map(|m| m.range())
        .collect()
}

fn is_masked(masked: &[Range<usize>], span: &Range<usize>) -> bool {
    masked
        .iter()
        .any(|m| m.start < span.end && span.start < m.end)
}
