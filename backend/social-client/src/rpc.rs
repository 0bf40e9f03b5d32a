//! Typed wrappers for remote procedures

use crate::client::SocialClient;
use crate::error::ClientResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

/// Leaderboard row of a mini-game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub score: i64,
    #[serde(default)]
    pub rank: Option<i64>,
}

impl SocialClient {
    /// Top scores of one game, best first
    pub async fn get_leaderboard(&self, game_type: &str, limit: usize) -> ClientResult<Vec<LeaderboardEntry>> {
        let params = json!({ "game_type": game_type, "limit_count": limit });
        let value = self
            .call(self.platform().rows.rpc("get_leaderboard", params))
            .await?;
        let entries: Vec<LeaderboardEntry> = match value {
            Value::Null => Vec::new(),
            other => serde_json::from_value(other)?,
        };
        debug!(game_type = %game_type, entries = entries.len(), "Leaderboard loaded");
        Ok(entries)
    }

    /// Existing one-to-one chat room with `other_user`, if any
    pub async fn find_direct_conversation(&self, other_user: Uuid) -> ClientResult<Option<Uuid>> {
        let viewer = self.viewer_id()?;
        let params = json!({ "user_a": viewer, "user_b": other_user });
        let value = self
            .call(self.platform().rows.rpc("find_direct_conversation", params))
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}
