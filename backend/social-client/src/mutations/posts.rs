use crate::aggregates::{adjust_post_likes, post_cache_keys};
use crate::client::SocialClient;
use crate::error::ClientResult;
use crate::models::{NotificationType, Post};
use crate::notify::{post_link, NotificationDraft};
use platform_client::{Filter, Query};
use query_cache::{CacheKey, Pages};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct OwnerRow {
    user_id: Uuid,
}

impl SocialClient {
    /// Like or unlike a post; returns whether the viewer now likes it
    pub async fn toggle_post_like(&self, post_id: Uuid) -> ClientResult<bool> {
        let viewer = self.viewer_id()?;
        let liked = match self.cached_post(post_id)? {
            Some(post) => post.viewer_has_liked,
            None => {
                let query = Query::table("post_likes")
                    .select("id")
                    .eq("post_id", post_id)
                    .eq("user_id", viewer)
                    .limit(1);
                !self
                    .call(self.platform().rows.select(&query))
                    .await?
                    .is_empty()
            }
        };

        let write = self.begin_optimistic("toggle_post_like", post_cache_keys(self.cache(), post_id)?);
        let delta = if liked { -1 } else { 1 };
        adjust_post_likes(self.cache(), post_id, delta, Some(!liked))?;

        let rows = self.platform().rows.clone();
        let result = if liked {
            let filters = [Filter::eq("post_id", post_id), Filter::eq("user_id", viewer)];
            self.call(rows.delete("post_likes", &filters)).await.map(|_| ())
        } else {
            let row = json!({ "post_id": post_id, "user_id": viewer });
            self.call(rows.insert("post_likes", vec![row])).await.map(|_| ())
        };
        write.settle(self, result).await?;

        if !liked {
            if let Some(owner) = self.post_owner(post_id).await {
                self.fan_out(vec![NotificationDraft::new(
                    owner,
                    NotificationType::Like,
                    viewer,
                    "liked your post",
                )
                .with_link(post_link(post_id))])
                    .await;
            }
        }

        debug!(post_id = %post_id, liked = !liked, "Post like toggled");
        Ok(!liked)
    }

    /// Post as cached under its own key or in any list
    pub(crate) fn cached_post(&self, post_id: Uuid) -> ClientResult<Option<Post>> {
        if let Some(post) = self.cache().get::<Post>(&CacheKey::post(post_id))? {
            return Ok(Some(post));
        }
        for key in self.cache().keys_with_prefix(&CacheKey::post_lists_prefix()) {
            let Some(pages) = self.cache().get::<Pages<Post>>(&key)? else {
                continue;
            };
            let found = pages.iter().find(|p| p.id == post_id).cloned();
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Author of a post, best-effort
    pub(crate) async fn post_owner(&self, post_id: Uuid) -> Option<Uuid> {
        if let Ok(Some(post)) = self.cached_post(post_id) {
            return Some(post.user_id);
        }
        let query = Query::table("posts").select("user_id").eq("id", post_id).limit(1);
        match self.call(self.platform().rows.select(&query)).await {
            Ok(rows) => crate::loaders::decode_rows::<OwnerRow>("posts", rows)
                .pop()
                .map(|r| r.user_id),
            Err(e) => {
                warn!(post_id = %post_id, error = %e, "Post owner lookup failed");
                None
            }
        }
    }
}
