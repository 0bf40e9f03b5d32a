//! Batched enrichment
//!
//! One `IN` query per attached field per page, never one query per row.

use crate::client::SocialClient;
use crate::error::ClientResult;
use crate::models::{ChatMessage, Comment, CommentLike, Post, ProfileSummary};
use platform_client::Query;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

const PROFILE_COLUMNS: &str = "id,username,display_name,avatar_url";

#[derive(Debug, Deserialize)]
struct LikeRow {
    id: Option<String>,
    #[serde(default)]
    post_id: Option<Uuid>,
    #[serde(default)]
    comment_id: Option<String>,
    user_id: Uuid,
}

/// Profiles by id; a failed lookup leaves authors unset
async fn profiles_by_id<I>(client: &SocialClient, ids: I) -> HashMap<Uuid, ProfileSummary>
where
    I: IntoIterator<Item = Uuid>,
{
    let mut seen = HashSet::new();
    let ids: Vec<Uuid> = ids.into_iter().filter(|id| seen.insert(*id)).collect();
    if ids.is_empty() {
        return HashMap::new();
    }

    let query = Query::table("profiles")
        .select(PROFILE_COLUMNS)
        .is_in("id", &ids);
    match client.call(client.platform().rows.select(&query)).await {
        Ok(rows) => super::decode_rows::<ProfileSummary>("profiles", rows)
            .into_iter()
            .map(|p| (p.id, p))
            .collect(),
        Err(e) => {
            warn!(error = %e, count = ids.len(), "Author lookup failed");
            HashMap::new()
        }
    }
}

pub(crate) async fn enrich_posts(client: &SocialClient, posts: &mut [Post]) -> ClientResult<()> {
    if posts.is_empty() {
        return Ok(());
    }

    let authors = profiles_by_id(client, posts.iter().map(|p| p.user_id)).await;

    let liked: HashSet<Uuid> = match client.platform().current_user_id() {
        Some(viewer) => {
            let query = Query::table("post_likes")
                .is_in("post_id", posts.iter().map(|p| p.id))
                .eq("user_id", viewer);
            let rows = client.call(client.platform().rows.select(&query)).await?;
            super::decode_rows::<LikeRow>("post_likes", rows)
                .into_iter()
                .filter_map(|l| l.post_id)
                .collect()
        }
        None => HashSet::new(),
    };

    for post in posts.iter_mut() {
        post.author = authors.get(&post.user_id).cloned();
        post.viewer_has_liked = liked.contains(&post.id);
    }
    Ok(())
}

pub(crate) async fn enrich_comments(
    client: &SocialClient,
    comments: &mut [Comment],
) -> ClientResult<()> {
    if comments.is_empty() {
        return Ok(());
    }

    let authors = profiles_by_id(client, comments.iter().map(|c| c.user_id)).await;

    let mut likes: HashMap<String, CommentLike> = HashMap::new();
    if let Some(viewer) = client.platform().current_user_id() {
        let ids: Vec<&str> = comments
            .iter()
            .filter(|c| !c.is_placeholder())
            .map(|c| c.id.as_str())
            .collect();
        if !ids.is_empty() {
            let query = Query::table("comment_likes")
                .is_in("comment_id", ids)
                .eq("user_id", viewer);
            let rows = client.call(client.platform().rows.select(&query)).await?;
            for like in super::decode_rows::<LikeRow>("comment_likes", rows) {
                if let Some(comment_id) = like.comment_id {
                    likes.insert(
                        comment_id,
                        CommentLike {
                            id: like.id,
                            user_id: like.user_id,
                        },
                    );
                }
            }
        }
    }

    for comment in comments.iter_mut() {
        comment.author = authors.get(&comment.user_id).cloned();
        comment.viewer_like = likes.remove(comment.id.as_str());
    }
    Ok(())
}

pub(crate) async fn enrich_chat(client: &SocialClient, messages: &mut [ChatMessage]) {
    let senders = profiles_by_id(client, messages.iter().map(|m| m.sender_id)).await;
    for message in messages.iter_mut() {
        message.sender = senders.get(&message.sender_id).cloned();
    }
}
