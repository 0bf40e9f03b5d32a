//! Notification fan-out
//!
//! Best-effort: drafts are filtered and written in one batched insert. A
//! failed insert is logged and never fails the mutation that caused it.

use crate::client::SocialClient;
use crate::models::NotificationType;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// Notification about to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub recipient: Uuid,
    pub kind: NotificationType,
    pub actor_id: Uuid,
    pub message: String,
    pub link: Option<String>,
}

impl NotificationDraft {
    pub fn new(recipient: Uuid, kind: NotificationType, actor_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            recipient,
            kind,
            actor_id,
            message: message.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    fn to_row(&self) -> Value {
        json!({
            "user_id": self.recipient,
            "type": self.kind,
            "actor_id": self.actor_id,
            "message": self.message,
            "link": self.link,
            "read": false,
        })
    }
}

/// Deep link to a post
pub fn post_link(post_id: Uuid) -> String {
    format!("/post/{}", post_id)
}

/// Drop self-notifications and repeats of the same recipient and kind
pub fn prepare(drafts: Vec<NotificationDraft>) -> Vec<NotificationDraft> {
    let mut seen = HashSet::new();
    drafts
        .into_iter()
        .filter(|d| d.recipient != d.actor_id)
        .filter(|d| seen.insert((d.recipient, d.kind)))
        .collect()
}

impl SocialClient {
    /// Write notifications; returns how many were stored
    pub async fn fan_out(&self, drafts: Vec<NotificationDraft>) -> usize {
        let drafts = prepare(drafts);
        if drafts.is_empty() {
            return 0;
        }

        let rows: Vec<Value> = drafts.iter().map(NotificationDraft::to_row).collect();
        match self
            .call(self.platform().rows.insert("notifications", rows))
            .await
        {
            Ok(stored) => {
                debug!(count = stored.len(), "Notifications sent");
                stored.len()
            }
            Err(e) => {
                warn!(error = %e, count = drafts.len(), "Failed to send notifications");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_skips_actor_and_duplicates() {
        let actor = Uuid::new_v4();
        let jane = Uuid::new_v4();
        let drafts = vec![
            NotificationDraft::new(actor, NotificationType::Mention, actor, "self"),
            NotificationDraft::new(jane, NotificationType::Mention, actor, "first"),
            NotificationDraft::new(jane, NotificationType::Mention, actor, "again"),
            NotificationDraft::new(jane, NotificationType::Comment, actor, "comment"),
        ];
        let prepared = prepare(drafts);
        assert_eq!(prepared.len(), 2);
        assert_eq!(prepared[0].message, "first");
        assert_eq!(prepared[1].kind, NotificationType::Comment);
    }

    #[test]
    fn test_row_shape() {
        let row = NotificationDraft::new(Uuid::nil(), NotificationType::Like, Uuid::from_u128(1), "liked")
            .with_link(post_link(Uuid::nil()))
            .to_row();
        assert_eq!(row["type"], "like");
        assert_eq!(row["read"], false);
        assert_eq!(row["link"], format!("/post/{}", Uuid::nil()));
    }
}
