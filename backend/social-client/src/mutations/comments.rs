use super::comment_keys;
use crate::aggregates::adjust_comment_count;
use crate::client::SocialClient;
use crate::error::{ClientError, ClientResult, ValidationError};
use crate::loaders::decode_rows;
use crate::media::{comment_object_path, validate_upload, MediaUpload};
use crate::models::{Comment, CommentId, CommentLike, NotificationType};
use crate::notify::{post_link, NotificationDraft};
use chrono::Utc;
use platform_client::{Filter, Query};
use query_cache::{CacheKey, Pages, WriteSource};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Input of `add_comment` / `add_reply`
#[derive(Debug, Clone, Default)]
pub struct NewComment {
    pub post_id: Uuid,
    pub text: Option<String>,
    pub parent_id: Option<CommentId>,
    pub media: Option<MediaUpload>,
}

impl NewComment {
    pub fn text(post_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            post_id,
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn reply_to(mut self, parent_id: CommentId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_media(mut self, media: MediaUpload) -> Self {
        self.media = Some(media);
        self
    }
}

/// Uploaded attachment, kept so a failed insert can remove it
struct StoredMedia {
    path: String,
    url: String,
}

impl SocialClient {
    /// Like or unlike a comment; returns whether the viewer now likes it
    pub async fn toggle_comment_like(&self, post_id: Uuid, comment_id: &CommentId) -> ClientResult<bool> {
        let viewer = self.viewer_id()?;
        if comment_id.is_placeholder() {
            return Err(ValidationError::PendingComment.into());
        }

        let cached = self.cached_comment(post_id, comment_id)?;
        let liked = match &cached {
            Some(comment) => comment.liked_by_viewer(),
            None => self.viewer_likes_comment(comment_id, viewer).await?,
        };

        let key = CacheKey::comments(post_id);
        let write = self.begin_optimistic("toggle_comment_like", vec![key.clone()]);
        self.cache()
            .update::<Pages<Comment>, _>(&key, WriteSource::Optimistic, |pages| {
                if let Some(comment) = pages.find_mut(|c| &c.id == comment_id) {
                    if liked {
                        comment.viewer_like = None;
                        comment.like_count = (comment.like_count - 1).max(0);
                    } else {
                        comment.viewer_like = Some(CommentLike {
                            id: None,
                            user_id: viewer,
                        });
                        comment.like_count += 1;
                    }
                }
            })?;

        let rows = self.platform().rows.clone();
        let result = if liked {
            let filters = [
                Filter::eq("comment_id", comment_id.as_str()),
                Filter::eq("user_id", viewer),
            ];
            self.call(rows.delete("comment_likes", &filters)).await.map(|_| ())
        } else {
            let row = json!({ "comment_id": comment_id.as_str(), "user_id": viewer });
            self.call(rows.insert("comment_likes", vec![row])).await.map(|_| ())
        };
        write.settle(self, result).await?;

        if !liked {
            if let Some(comment) = cached {
                self.fan_out(vec![NotificationDraft::new(
                    comment.user_id,
                    NotificationType::Like,
                    viewer,
                    "liked your comment",
                )
                .with_link(post_link(post_id))])
                    .await;
            }
        }

        debug!(post_id = %post_id, comment_id = %comment_id, liked = !liked, "Comment like toggled");
        Ok(!liked)
    }

    /// Delete one of the viewer's comments and its stored media
    pub async fn delete_comment(&self, post_id: Uuid, comment_id: &CommentId) -> ClientResult<()> {
        let viewer = self.viewer_id()?;
        if comment_id.is_placeholder() {
            return Err(ValidationError::PendingComment.into());
        }
        let comment = self.owned_comment(post_id, comment_id, viewer).await?;

        let key = CacheKey::comments(post_id);
        let write = self.begin_optimistic("delete_comment", comment_keys(self, post_id)?);
        self.cache()
            .update::<Pages<Comment>, _>(&key, WriteSource::Optimistic, |pages| {
                pages.remove_where(|c| &c.id == comment_id);
            })?;
        adjust_comment_count(self.cache(), post_id, -1)?;

        let filters = [
            Filter::eq("id", comment_id.as_str()),
            Filter::eq("user_id", viewer),
        ];
        let result = match self
            .call(self.platform().rows.delete("comments", &filters))
            .await
        {
            Ok(deleted) if deleted.is_empty() => {
                Err(ClientError::NotFound(format!("comment {}", comment_id)))
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        write.settle(self, result).await?;

        if let Some(url) = &comment.image_url {
            self.remove_comment_media(url).await;
        }

        info!(post_id = %post_id, comment_id = %comment_id, "Comment deleted");
        Ok(())
    }

    /// Post a top-level comment
    pub async fn add_comment(&self, new: NewComment) -> ClientResult<Comment> {
        self.create_comment(new).await
    }

    /// Post a reply to `parent_id`
    pub async fn add_reply(&self, new: NewComment, parent_id: CommentId) -> ClientResult<Comment> {
        self.create_comment(new.reply_to(parent_id)).await
    }

    /// Replace the text of one of the viewer's comments
    pub async fn edit_comment(
        &self,
        post_id: Uuid,
        comment_id: &CommentId,
        text: &str,
    ) -> ClientResult<Comment> {
        let viewer = self.viewer_id()?;
        if comment_id.is_placeholder() {
            return Err(ValidationError::PendingComment.into());
        }
        let existing = self.owned_comment(post_id, comment_id, viewer).await?;
        let text = text.trim().to_string();
        self.check_text(&text, existing.image_url.is_some())?;

        let key = CacheKey::comments(post_id);
        let edited_at = Utc::now();
        let write = self.begin_optimistic("edit_comment", vec![key.clone()]);
        self.cache()
            .update::<Pages<Comment>, _>(&key, WriteSource::Optimistic, |pages| {
                if let Some(comment) = pages.find_mut(|c| &c.id == comment_id) {
                    comment.text = Some(text.clone()).filter(|t| !t.is_empty());
                    comment.mentions.clear();
                    comment.updated_at = Some(edited_at);
                }
            })?;

        let result = async {
            let mentions = self.resolve_mentions(&text).await;
            let patch = json!({
                "text": Some(text.as_str()).filter(|t| !t.is_empty()),
                "mentions": mentions.records,
                "updated_at": edited_at,
            });
            let filters = [
                Filter::eq("id", comment_id.as_str()),
                Filter::eq("user_id", viewer),
            ];
            let rows = self
                .call(self.platform().rows.update("comments", &filters, patch))
                .await?;
            decode_rows::<Comment>("comments", rows)
                .pop()
                .ok_or_else(|| ClientError::NotFound(format!("comment {}", comment_id)))
        }
        .await;

        write.settle(self, result).await
    }

    async fn create_comment(&self, new: NewComment) -> ClientResult<Comment> {
        let viewer = self.viewer_id()?;
        let text = new
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        self.check_text(text.as_deref().unwrap_or(""), new.media.is_some())?;
        if let Some(media) = &new.media {
            validate_upload(media, &self.config().storage)?;
        }
        if new.parent_id.as_ref().is_some_and(CommentId::is_placeholder) {
            return Err(ValidationError::PendingComment.into());
        }

        let post_id = new.post_id;
        let key = CacheKey::comments(post_id);
        let write = self.begin_optimistic("add_comment", comment_keys(self, post_id)?);
        let placeholder = Comment::placeholder(
            post_id,
            viewer,
            new.parent_id.clone(),
            text.clone(),
            None,
        );
        self.cache()
            .update::<Pages<Comment>, _>(&key, WriteSource::Optimistic, |pages| {
                pages.prepend(placeholder)
            })?;
        adjust_comment_count(self.cache(), post_id, 1)?;

        let result = self
            .insert_comment(viewer, post_id, text.as_deref(), new.parent_id.as_ref(), new.media)
            .await;
        let (comment, mentioned) = write.settle(self, result).await?;

        self.notify_new_comment(&comment, viewer, mentioned).await;
        info!(post_id = %post_id, comment_id = %comment.id, "Comment posted");
        Ok(comment)
    }

    /// Network phase of a new comment: upload, resolve mentions, insert
    async fn insert_comment(
        &self,
        viewer: Uuid,
        post_id: Uuid,
        text: Option<&str>,
        parent_id: Option<&CommentId>,
        media: Option<MediaUpload>,
    ) -> ClientResult<(Comment, Vec<Uuid>)> {
        let stored = match media {
            Some(media) => Some(self.upload_comment_media(post_id, viewer, media).await?),
            None => None,
        };

        let mentions = match text {
            Some(text) => self.resolve_mentions(text).await,
            None => Default::default(),
        };

        let row = json!({
            "post_id": post_id,
            "user_id": viewer,
            "parent_comment_id": parent_id,
            "text": text,
            "image_url": stored.as_ref().map(|m| m.url.as_str()),
            "mentions": mentions.records,
        });

        let inserted = match self
            .call(self.platform().rows.insert("comments", vec![row]))
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                if let Some(media) = &stored {
                    self.discard_upload(media).await;
                }
                return Err(e);
            }
        };

        let comment = decode_rows::<Comment>("comments", inserted)
            .pop()
            .ok_or_else(|| ClientError::InvalidData("insert returned no comment".to_string()))?;
        Ok((comment, mentions.user_ids()))
    }

    async fn upload_comment_media(
        &self,
        post_id: Uuid,
        viewer: Uuid,
        media: MediaUpload,
    ) -> ClientResult<StoredMedia> {
        let bucket = &self.config().storage.comment_media_bucket;
        let path = comment_object_path(post_id, viewer, Utc::now(), &media.content_type);
        let stored = self
            .call(self.platform().storage.upload(
                bucket,
                &path,
                media.bytes,
                &media.content_type,
            ))
            .await?;
        let url = self.platform().storage.public_url(bucket, &stored);
        debug!(path = %stored, "Comment media uploaded");
        Ok(StoredMedia { path: stored, url })
    }

    async fn discard_upload(&self, media: &StoredMedia) {
        let bucket = &self.config().storage.comment_media_bucket;
        let paths = [media.path.clone()];
        if let Err(e) = self.call(self.platform().storage.remove(bucket, &paths)).await {
            warn!(path = %media.path, error = %e, "Failed to remove orphaned upload");
        }
    }

    async fn remove_comment_media(&self, url: &str) {
        let bucket = &self.config().storage.comment_media_bucket;
        let Some(path) = self.platform().storage.path_from_public_url(bucket, url) else {
            warn!(url = %url, "Comment media URL has no storage path");
            return;
        };
        let paths = [path];
        if let Err(e) = self.call(self.platform().storage.remove(bucket, &paths)).await {
            warn!(path = %paths[0], error = %e, "Failed to remove comment media");
        }
    }

    async fn notify_new_comment(&self, comment: &Comment, viewer: Uuid, mentioned: Vec<Uuid>) {
        let link = post_link(comment.post_id);
        let mut drafts: Vec<NotificationDraft> = mentioned
            .into_iter()
            .map(|user| {
                NotificationDraft::new(user, NotificationType::Mention, viewer, "mentioned you in a comment")
                    .with_link(link.clone())
            })
            .collect();

        if let Some(owner) = self.post_owner(comment.post_id).await {
            drafts.push(
                NotificationDraft::new(owner, NotificationType::Comment, viewer, "commented on your post")
                    .with_link(link.clone()),
            );
        }

        if let Some(parent_id) = &comment.parent_comment_id {
            match self.find_comment(comment.post_id, parent_id).await {
                Ok(parent) => drafts.push(
                    NotificationDraft::new(
                        parent.user_id,
                        NotificationType::Comment,
                        viewer,
                        "replied to your comment",
                    )
                    .with_link(link),
                ),
                Err(e) => warn!(parent_id = %parent_id, error = %e, "Reply parent lookup failed"),
            }
        }

        self.fan_out(drafts).await;
    }

    fn check_text(&self, text: &str, has_media: bool) -> Result<(), ValidationError> {
        if text.trim().is_empty() && !has_media {
            return Err(ValidationError::EmptyComment);
        }
        let length = text.chars().count();
        let max = self.config().comments.max_length;
        if length > max {
            return Err(ValidationError::CommentTooLong { length, max });
        }
        Ok(())
    }

    fn cached_comment(&self, post_id: Uuid, comment_id: &CommentId) -> ClientResult<Option<Comment>> {
        let pages: Option<Pages<Comment>> = self.cache().get(&CacheKey::comments(post_id))?;
        Ok(pages.and_then(|p| p.iter().find(|c| &c.id == comment_id).cloned()))
    }

    /// Comment from cache, or from the platform when not loaded
    async fn find_comment(&self, post_id: Uuid, comment_id: &CommentId) -> ClientResult<Comment> {
        if let Some(comment) = self.cached_comment(post_id, comment_id)? {
            return Ok(comment);
        }
        let query = Query::table("comments").eq("id", comment_id.as_str()).limit(1);
        let rows = self.call(self.platform().rows.select(&query)).await?;
        decode_rows::<Comment>("comments", rows)
            .pop()
            .ok_or_else(|| ClientError::NotFound(format!("comment {}", comment_id)))
    }

    async fn owned_comment(&self, post_id: Uuid, comment_id: &CommentId, viewer: Uuid) -> ClientResult<Comment> {
        let comment = self.find_comment(post_id, comment_id).await?;
        if comment.user_id != viewer {
            return Err(ValidationError::NotOwner.into());
        }
        Ok(comment)
    }

    async fn viewer_likes_comment(&self, comment_id: &CommentId, viewer: Uuid) -> ClientResult<bool> {
        let query = Query::table("comment_likes")
            .select("id")
            .eq("comment_id", comment_id.as_str())
            .eq("user_id", viewer)
            .limit(1);
        let rows: Vec<Value> = self.call(self.platform().rows.select(&query)).await?;
        Ok(!rows.is_empty())
    }
}
