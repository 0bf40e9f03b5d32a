//! Unified cache key schema
//!
//! Every loader, mutation and realtime watch builds keys through [`CacheKey`].
//! Key format: v{VERSION}:{entity}:{identifier}[:sub_key]

use uuid::Uuid;

/// Cache schema version - increment when changing key formats
pub const CACHE_VERSION: u32 = 1;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    // ============= Post Keys =============

    /// Single post
    /// Format: v1:post:{post_id}
    pub fn post(post_id: Uuid) -> String {
        format!("v{}:post:{}", CACHE_VERSION, post_id)
    }

    /// Home feed (list of posts)
    /// Format: v1:posts:feed
    pub fn feed() -> String {
        format!("v{}:posts:feed", CACHE_VERSION)
    }

    /// A user's posts (list of posts)
    /// Format: v1:posts:user:{user_id}
    pub fn user_posts(user_id: Uuid) -> String {
        format!("v{}:posts:user:{}", CACHE_VERSION, user_id)
    }

    /// Prefix shared by every list-of-posts key
    pub fn post_lists_prefix() -> String {
        format!("v{}:posts:", CACHE_VERSION)
    }

    // ============= Comment Keys =============

    /// Paginated comments of a post
    /// Format: v1:comments:{post_id}
    pub fn comments(post_id: Uuid) -> String {
        format!("v{}:comments:{}", CACHE_VERSION, post_id)
    }

    // ============= Chat Keys =============

    /// Paginated messages of a chat room
    /// Format: v1:chat:{room_id}
    pub fn chat(room_id: Uuid) -> String {
        format!("v{}:chat:{}", CACHE_VERSION, room_id)
    }

    // ============= Notification Keys =============

    /// Paginated notifications of a user
    /// Format: v1:notifications:{user_id}
    pub fn notifications(user_id: Uuid) -> String {
        format!("v{}:notifications:{}", CACHE_VERSION, user_id)
    }

    // ============= Utility =============

    /// Extract entity type from key
    pub fn entity_type(key: &str) -> Option<&str> {
        // Format: v{N}:{entity}:...
        let mut parts = key.split(':');
        match (parts.next(), parts.next()) {
            (Some(_), Some(entity)) => Some(entity),
            _ => None,
        }
    }

    /// Whether the key holds a list of posts
    pub fn is_post_list(key: &str) -> bool {
        key.starts_with(&Self::post_lists_prefix())
    }
}
