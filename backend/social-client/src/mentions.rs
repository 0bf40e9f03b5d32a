//! Mention resolution against the `profiles` table

use crate::client::{with_timeout, SocialClient};
use async_trait::async_trait;
use mention_parser::{
    extract_mention_tokens, mention_records, resolve_profiles, MentionError, MentionRecord,
    MentionResult, ProfileLookup, ResolvedProfile,
};
use platform_client::{Query, RowStore};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Looks names up by username in one `IN` query
#[derive(Clone)]
pub struct PlatformProfileLookup {
    rows: Arc<dyn RowStore>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct UsernameRow {
    id: Uuid,
    username: String,
}

impl PlatformProfileLookup {
    pub fn new(rows: Arc<dyn RowStore>, timeout: Duration) -> Self {
        Self { rows, timeout }
    }
}

#[async_trait]
impl ProfileLookup for PlatformProfileLookup {
    async fn lookup_names(&self, names: &[String]) -> MentionResult<Vec<ResolvedProfile>> {
        let query = Query::table("profiles")
            .select("id,username")
            .is_in("username", names);
        let rows = with_timeout(self.timeout, self.rows.select(&query))
            .await
            .map_err(|e| MentionError::Lookup(e.to_string()))?;

        Ok(crate::loaders::decode_rows::<UsernameRow>("profiles", rows)
            .into_iter()
            .map(|r| ResolvedProfile {
                user_id: r.id,
                name: r.username,
            })
            .collect())
    }
}

/// Mentions found in a comment body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedMentions {
    pub records: Vec<MentionRecord>,
}

impl ResolvedMentions {
    /// Mentioned users, first occurrence order, each once
    pub fn user_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = Vec::new();
        for record in &self.records {
            if !ids.contains(&record.user_id) {
                ids.push(record.user_id);
            }
        }
        ids
    }
}

impl SocialClient {
    pub fn profile_lookup(&self) -> PlatformProfileLookup {
        PlatformProfileLookup::new(
            self.platform().rows.clone(),
            self.config().platform.request_timeout,
        )
    }

    /// Resolve `@username` mentions in `text`
    ///
    /// Best-effort: a failed lookup yields no mentions and the comment is
    /// posted as plain text.
    pub async fn resolve_mentions(&self, text: &str) -> ResolvedMentions {
        let tokens = extract_mention_tokens(text);
        if tokens.is_empty() {
            return ResolvedMentions::default();
        }

        let profiles = match resolve_profiles(&self.profile_lookup(), &tokens).await {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!(error = %e, "Mention lookup failed");
                return ResolvedMentions::default();
            }
        };

        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        let matches = match self.mentions().extract(text, &names) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, "Mention matching failed");
                Vec::new()
            }
        };

        let records = mention_records(&matches, &profiles);
        debug!(tokens = tokens.len(), mentions = records.len(), "Resolved mentions");
        ResolvedMentions { records }
    }
}
