use super::ProfileSummary;
use chrono::{DateTime, Utc};
use mention_parser::MentionRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix of locally fabricated comment ids
pub const PLACEHOLDER_PREFIX: &str = "optimistic-";

/// Comment identifier: a server id, or a placeholder awaiting confirmation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(String);

impl CommentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh placeholder id, never equal to a server id
    pub fn placeholder() -> Self {
        Self(format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4()))
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Server id as a UUID; `None` for placeholders
    pub fn as_uuid(&self) -> Option<Uuid> {
        if self.is_placeholder() {
            return None;
        }
        Uuid::parse_str(&self.0).ok()
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for CommentId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

/// The viewer's like on a comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentLike {
    /// `None` while the like is speculative
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: Uuid,
}

/// Comment on a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub parent_comment_id: Option<CommentId>,
    /// `None` for image-only comments
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub mentions: Vec<MentionRecord>,

    // Enrichment
    #[serde(default)]
    pub viewer_like: Option<CommentLike>,
    #[serde(default)]
    pub author: Option<ProfileSummary>,
}

impl Comment {
    /// Local row shown until the insert is confirmed
    pub fn placeholder(
        post_id: Uuid,
        user_id: Uuid,
        parent_comment_id: Option<CommentId>,
        text: Option<String>,
        author: Option<ProfileSummary>,
    ) -> Self {
        Self {
            id: CommentId::placeholder(),
            post_id,
            user_id,
            parent_comment_id,
            text,
            image_url: None,
            created_at: Utc::now(),
            updated_at: None,
            like_count: 0,
            mentions: Vec::new(),
            viewer_like: None,
            author,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.is_placeholder()
    }

    pub fn liked_by_viewer(&self) -> bool {
        self.viewer_like.is_some()
    }

    /// Text with structured mentions interleaved
    pub fn segments(&self) -> Vec<mention_parser::Segment<'_>> {
        match &self.text {
            Some(text) => mention_parser::segments(text, &self.mentions),
            None => Vec::new(),
        }
    }
}
