//! Domain models
//!
//! Rows as the platform stores them, plus the fields enrichment attaches
//! (`author`, `viewer_like`, `viewer_has_liked`). Enrichment fields are never
//! written back to the platform.

mod chat;
mod comment;
mod notification;
mod post;
mod profile;

pub use chat::ChatMessage;
pub use comment::{Comment, CommentId, CommentLike, PLACEHOLDER_PREFIX};
pub use notification::{Notification, NotificationType};
pub use post::Post;
pub use profile::ProfileSummary;
