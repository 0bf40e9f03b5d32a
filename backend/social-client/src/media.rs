//! Comment media
//!
//! Uploads are validated before any network call and stored under a
//! deterministic path: `comments/{post_id}/{user_id}-{millis}.{ext}`.

use crate::config::StorageConfig;
use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// File attached to a new comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl MediaUpload {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// File extension for a MIME type
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        _ => "bin",
    }
}

/// Object path for a comment attachment
pub fn comment_object_path(
    post_id: Uuid,
    user_id: Uuid,
    uploaded_at: DateTime<Utc>,
    content_type: &str,
) -> String {
    format!(
        "comments/{}/{}-{}.{}",
        post_id,
        user_id,
        uploaded_at.timestamp_millis(),
        extension_for(content_type)
    )
}

/// Check type and size against the storage limits
pub fn validate_upload(upload: &MediaUpload, limits: &StorageConfig) -> Result<(), ValidationError> {
    let allowed = limits
        .allowed_media_types
        .iter()
        .any(|t| t.eq_ignore_ascii_case(&upload.content_type));
    if !allowed {
        return Err(ValidationError::UnsupportedMediaType(
            upload.content_type.clone(),
        ));
    }
    if upload.len() > limits.max_upload_bytes {
        return Err(ValidationError::FileTooLarge {
            size: upload.len(),
            max: limits.max_upload_bytes,
        });
    }
    Ok(())
}
