use super::ProfileSummary;
use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Post in a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub content: Option<String>,
    /// Index-aligned with `media_types`
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub media_types: Vec<String>,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub comment_count: i64,
    /// Original post when this is a repost
    #[serde(default)]
    pub repost_of: Option<Uuid>,
    #[serde(default)]
    pub original_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    // Enrichment
    #[serde(default)]
    pub viewer_has_liked: bool,
    #[serde(default)]
    pub author: Option<ProfileSummary>,
}

impl Post {
    /// Media URLs and types must line up one to one
    pub fn validate_media(&self) -> Result<(), ValidationError> {
        if self.media_urls.len() != self.media_types.len() {
            return Err(ValidationError::MediaMismatch {
                urls: self.media_urls.len(),
                types: self.media_types.len(),
            });
        }
        Ok(())
    }

    pub fn is_repost(&self) -> bool {
        self.repost_of.is_some()
    }

    /// `(url, type)` pairs
    pub fn media(&self) -> impl Iterator<Item = (&str, &str)> {
        self.media_urls
            .iter()
            .zip(self.media_types.iter())
            .map(|(u, t)| (u.as_str(), t.as_str()))
    }
}
