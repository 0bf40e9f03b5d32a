//! Mention resolution
//!
//! Names are resolved with exactly one batched lookup per call, never one
//! lookup per mention.

use crate::MentionResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

/// Profile matched by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedProfile {
    pub user_id: Uuid,
    pub name: String,
}

/// Batched name lookup against the persistence layer
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    /// Profiles whose name is in `names` (`name IN (...)`)
    async fn lookup_names(&self, names: &[String]) -> MentionResult<Vec<ResolvedProfile>>;
}

/// Resolve names to profiles, deduplicated by user id
pub async fn resolve_profiles<L, S>(lookup: &L, names: &[S]) -> MentionResult<Vec<ResolvedProfile>>
where
    L: ProfileLookup + ?Sized,
    S: AsRef<str>,
{
    let unique = unique_names(names);
    if unique.is_empty() {
        return Ok(Vec::new());
    }

    let profiles = lookup.lookup_names(&unique).await?;
    let mut seen = HashSet::new();
    let resolved: Vec<ResolvedProfile> = profiles
        .into_iter()
        .filter(|p| seen.insert(p.user_id))
        .collect();

    debug!(
        requested = unique.len(),
        resolved = resolved.len(),
        "Resolved mention names"
    );
    Ok(resolved)
}

/// Resolve names to deduplicated user ids
///
/// # Examples
/// ```
/// # use mention_parser::{resolve_mentions_to_ids, ProfileLookup, ResolvedProfile, MentionResult};
/// # use uuid::Uuid;
/// struct Directory(Uuid);
///
/// #[async_trait::async_trait]
/// impl ProfileLookup for Directory {
///     async fn lookup_names(&self, names: &[String]) -> MentionResult<Vec<ResolvedProfile>> {
///         Ok(names
///             .iter()
///             .filter(|n| n.as_str() == "bob")
///             .map(|n| ResolvedProfile { user_id: self.0, name: n.clone() })
///             .collect())
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let bob = Uuid::new_v4();
/// let ids = resolve_mentions_to_ids(&Directory(bob), &["bob", "bob"]).await.unwrap();
/// assert_eq!(ids, vec![bob]);
/// # });
/// ```
pub async fn resolve_mentions_to_ids<L, S>(lookup: &L, names: &[S]) -> MentionResult<Vec<Uuid>>
where
    L: ProfileLookup + ?Sized,
    S: AsRef<str>,
{
    Ok(resolve_profiles(lookup, names)
        .await?
        .into_iter()
        .map(|p| p.user_id)
        .collect())
}

/// Trimmed, non-empty names with exact duplicates removed, first spelling kept
fn unique_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.as_ref().trim())
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(n.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MentionError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLookup {
        calls: AtomicUsize,
        known: Vec<ResolvedProfile>,
    }

    #[async_trait]
    impl ProfileLookup for CountingLookup {
        async fn lookup_names(&self, names: &[String]) -> MentionResult<Vec<ResolvedProfile>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .known
                .iter()
                .filter(|p| names.contains(&p.name))
                .cloned()
                .collect())
        }
    }

    struct FailingLookup;

    #[async_trait]
    impl ProfileLookup for FailingLookup {
        async fn lookup_names(&self, _names: &[String]) -> MentionResult<Vec<ResolvedProfile>> {
            Err(MentionError::Lookup("connection reset".to_string()))
        }
    }

    fn lookup_with(names: &[&str]) -> CountingLookup {
        CountingLookup {
            calls: AtomicUsize::new(0),
            known: names
                .iter()
                .map(|n| ResolvedProfile {
                    user_id: Uuid::new_v4(),
                    name: n.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_single_batched_lookup() {
        let lookup = lookup_with(&["bob", "alice"]);
        let ids = resolve_mentions_to_ids(&lookup, &["bob", "alice", "bob", "ghost"])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_names_skip_lookup() {
        let lookup = lookup_with(&["bob"]);
        let none: Vec<String> = Vec::new();
        let ids = resolve_mentions_to_ids(&lookup, &none).await.unwrap();
        assert!(ids.is_empty());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_ids_collapsed() {
        let user_id = Uuid::new_v4();
        let lookup = CountingLookup {
            calls: AtomicUsize::new(0),
            known: vec![
                ResolvedProfile {
                    user_id,
                    name: "bob".to_string(),
                },
                ResolvedProfile {
                    user_id,
                    name: "Bobby".to_string(),
                },
            ],
        };
        let ids = resolve_mentions_to_ids(&lookup, &["bob", "Bobby"]).await.unwrap();
        assert_eq!(ids, vec![user_id]);
    }

    #[tokio::test]
    async fn test_lookup_error_propagates() {
        let result = resolve_mentions_to_ids(&FailingLookup, &["bob"]).await;
        assert!(matches!(result, Err(MentionError::Lookup(_))));
    }
}
