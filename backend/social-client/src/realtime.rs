//! Realtime watches for the screens that stay live
//!
//! - comment threads: invalidate and refetch on any change to the post's comments
//! - chat rooms: merge new messages at the tail, with the sender attached
//! - notifications: merge new notifications at the head

use crate::client::SocialClient;
use crate::error::ClientResult;
use crate::loaders::{enrich_chat, CommentsSource};
use crate::models::ChatMessage;
use platform_client::{ChannelSpec, Filter};
use query_cache::CacheKey;
use realtime_bridge::{BridgeError, Placement, SyncPolicy, WatchHandle, WatchSpec};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

impl SocialClient {
    /// Keep a post's cached comments in sync; drop the handle when the screen closes
    pub fn watch_comments(&self, post_id: Uuid) -> ClientResult<WatchHandle> {
        let client = self.clone();
        let policy = SyncPolicy::invalidate(move || {
            let client = client.clone();
            async move {
                client
                    .refetch(&CommentsSource::new(post_id))
                    .await
                    .map(|_| ())
                    .map_err(|e| BridgeError::Refetch(e.to_string()))
            }
        });

        Ok(self.bridge().watch(WatchSpec {
            key: CacheKey::comments(post_id),
            channel: ChannelSpec::filtered(
                format!("comments:{}", post_id),
                "comments",
                Filter::eq("post_id", post_id),
            ),
            policy,
        })?)
    }

    pub fn watch_chat(&self, room_id: Uuid) -> ClientResult<WatchHandle> {
        let client = self.clone();
        let policy = SyncPolicy::merge_enriched(Placement::Append, move |row| {
            let client = client.clone();
            async move { client.with_sender(row).await }
        });

        Ok(self.bridge().watch(WatchSpec {
            key: CacheKey::chat(room_id),
            channel: ChannelSpec::filtered(
                format!("chat:{}", room_id),
                "chat_messages",
                Filter::eq("room_id", room_id),
            ),
            policy,
        })?)
    }

    /// Live message row with its sender profile; the raw row when it does not decode
    async fn with_sender(&self, row: Value) -> Value {
        let message: ChatMessage = match serde_json::from_value(row.clone()) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Live chat row left unenriched");
                return row;
            }
        };
        let mut messages = [message];
        enrich_chat(self, &mut messages).await;
        let [message] = messages;
        serde_json::to_value(message).unwrap_or(row)
    }

    /// Watch the signed-in user's notifications
    pub fn watch_notifications(&self) -> ClientResult<WatchHandle> {
        let viewer = self.viewer_id()?;
        Ok(self.bridge().watch(WatchSpec {
            key: CacheKey::notifications(viewer),
            channel: ChannelSpec::filtered(
                format!("notifications:{}", viewer),
                "notifications",
                Filter::eq("user_id", viewer),
            ),
            policy: SyncPolicy::merge(Placement::Prepend),
        })?)
    }
}
