//! Error types for the social client
//!
//! Validation errors are raised before any network call. Platform errors keep
//! the platform's own message so it can be shown to the user as-is.

use platform_client::PlatformError;
use query_cache::CacheError;
use realtime_bridge::BridgeError;
use std::time::Duration;
use thiserror::Error;

/// Result type for social client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Input rejected before reaching the platform
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Comment cannot be empty")]
    EmptyComment,

    #[error("Comment is too long ({length} characters, max {max})")]
    CommentTooLong { length: usize, max: usize },

    #[error("Unsupported file type: {0}")]
    UnsupportedMediaType(String),

    #[error("File is too large ({size} bytes, max {max})")]
    FileTooLarge { size: usize, max: usize },

    #[error("Media URLs and types do not line up ({urls} URLs, {types} types)")]
    MediaMismatch { urls: usize, types: usize },

    #[error("You need to be signed in")]
    NotSignedIn,

    #[error("Only the author can change this comment")]
    NotOwner,

    #[error("This comment is still being posted")]
    PendingComment,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Realtime error: {0}")]
    Realtime(#[from] BridgeError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::InvalidData(e.to_string())
    }
}

impl ClientError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }

    /// Text for a toast or inline error
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(e) => e.to_string(),
            ClientError::Platform(PlatformError::Api { message, .. }) => message.clone(),
            ClientError::Platform(PlatformError::NotAuthenticated) => {
                ValidationError::NotSignedIn.to_string()
            }
            ClientError::Timeout(_) => "The request timed out. Please try again.".to_string(),
            ClientError::NotFound(_) => "This item is no longer available.".to_string(),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}
