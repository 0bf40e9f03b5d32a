//! Merging row changes into cached pages
//!
//! Merges are keyed by the row's `id`, so replaying an event is a no-op.

use crate::BridgeResult;
use platform_client::{ChangeEvent, ChangeKind};
use query_cache::{Pages, QueryCache, WriteSource};
use serde_json::Value;

/// Where new rows go in the cached list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Tail of the last page (oldest-first streams)
    Append,
    /// Head of the first page (newest-first streams)
    Prepend,
}

/// What a merge did to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    Removed,
    /// Tail insert held back: later pages are not loaded yet and will bring the row
    Deferred,
    /// Nothing cached under the key, or the row was not present
    Ignored,
}

fn row_id(row: &Value) -> Option<&Value> {
    row.get("id").filter(|id| !id.is_null())
}

/// Apply one change to the pages cached under `key`
pub fn merge_change(
    cache: &QueryCache,
    key: &str,
    placement: Placement,
    event: &ChangeEvent,
) -> BridgeResult<MergeOutcome> {
    let Some(id) = row_id(event.record()).cloned() else {
        return Ok(MergeOutcome::Ignored);
    };

    let mut outcome = MergeOutcome::Ignored;
    cache.update::<Pages<Value>, _>(key, WriteSource::Realtime, |pages| {
        outcome = match event.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                match pages.find_mut(|row| row_id(row) == Some(&id)) {
                    Some(existing) => {
                        *existing = merged(existing, &event.new);
                        MergeOutcome::Replaced
                    }
                    None if event.kind == ChangeKind::Insert => match placement {
                        Placement::Append if pages.has_next_page() => MergeOutcome::Deferred,
                        Placement::Append => {
                            pages.append(event.new.clone());
                            MergeOutcome::Inserted
                        }
                        Placement::Prepend => {
                            pages.prepend(event.new.clone());
                            MergeOutcome::Inserted
                        }
                    },
                    None => MergeOutcome::Ignored,
                }
            }
            ChangeKind::Delete => {
                if pages.remove_where(|row| row_id(row) == Some(&id)) > 0 {
                    MergeOutcome::Removed
                } else {
                    MergeOutcome::Ignored
                }
            }
        };
    })?;

    Ok(outcome)
}

/// Incoming columns win; fields the platform row lacks (joined author data) are kept
fn merged(existing: &Value, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Value::Object(current), Value::Object(changes)) => {
            let mut row = current.clone();
            for (field, value) in changes {
                row.insert(field.clone(), value.clone());
            }
            Value::Object(row)
        }
        _ => incoming.clone(),
    }
}
