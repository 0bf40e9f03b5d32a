//! Optimistic mutations
//!
//! Every mutation runs the same three phases:
//!
//! ```text
//! 1. begin_optimistic(keys)   cancel in-flight fetches, snapshot each key
//!    speculative writes       cache shows the post-mutation state now
//! 2. network call             bounded by the request timeout
//! 3. settle(result)           error → restore the snapshot verbatim
//!                             always → invalidate and refetch cached keys
//! ```
//!
//! Side effects (notifications, storage cleanup, mention lookup) are
//! best-effort and only logged when they fail.

mod comments;
mod notifications;
mod posts;

pub use comments::NewComment;

use crate::aggregates::post_cache_keys;
use crate::client::SocialClient;
use crate::error::ClientResult;
use query_cache::{CacheKey, Snapshot};
use tracing::{debug, warn};
use uuid::Uuid;

/// Snapshot taken at the start of one mutation
#[must_use = "an optimistic write must be settled"]
pub(crate) struct OptimisticWrite {
    label: &'static str,
    keys: Vec<String>,
    snapshot: Snapshot,
}

impl OptimisticWrite {
    /// Roll back on error, then reconcile every touched key with the server
    pub(crate) async fn settle<T>(self, client: &SocialClient, result: ClientResult<T>) -> ClientResult<T> {
        match &result {
            Ok(_) => debug!(mutation = self.label, "Mutation confirmed"),
            Err(e) => {
                warn!(mutation = self.label, error = %e, "Mutation failed, rolling back");
                client.cache().restore(self.snapshot);
            }
        }
        client.reconcile(&self.keys).await;
        result
    }
}

impl SocialClient {
    /// Cancel fetches for `keys` and snapshot them, before any speculative write
    pub(crate) fn begin_optimistic(&self, label: &'static str, keys: Vec<String>) -> OptimisticWrite {
        self.cache().cancel_many(&keys);
        let snapshot = self.cache().snapshot(&keys);
        OptimisticWrite {
            label,
            keys,
            snapshot,
        }
    }
}

/// Keys a comment mutation on `post_id` may touch
pub(crate) fn comment_keys(client: &SocialClient, post_id: Uuid) -> ClientResult<Vec<String>> {
    let mut keys = vec![CacheKey::comments(post_id)];
    keys.extend(post_cache_keys(client.cache(), post_id)?);
    Ok(keys)
}
