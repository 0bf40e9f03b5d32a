use crate::client::SocialClient;
use crate::error::{ClientError, ClientResult};
use crate::models::Notification;
use platform_client::Filter;
use query_cache::{CacheKey, Pages, WriteSource};
use serde_json::json;
use uuid::Uuid;

impl SocialClient {
    pub async fn mark_notification_read(&self, notification_id: Uuid) -> ClientResult<()> {
        let viewer = self.viewer_id()?;
        let key = CacheKey::notifications(viewer);

        let write = self.begin_optimistic("mark_notification_read", vec![key.clone()]);
        self.cache()
            .update::<Pages<Notification>, _>(&key, WriteSource::Optimistic, |pages| {
                if let Some(n) = pages.find_mut(|n| n.id == notification_id) {
                    n.read = true;
                }
            })?;

        let filters = [
            Filter::eq("id", notification_id),
            Filter::eq("user_id", viewer),
        ];
        let result = match self
            .call(self.platform().rows.update("notifications", &filters, json!({ "read": true })))
            .await
        {
            Ok(rows) if rows.is_empty() => Err(ClientError::NotFound(format!(
                "notification {}",
                notification_id
            ))),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        write.settle(self, result).await
    }

    /// Mark every unread notification read; returns how many changed
    pub async fn mark_all_notifications_read(&self) -> ClientResult<usize> {
        let viewer = self.viewer_id()?;
        let key = CacheKey::notifications(viewer);

        let write = self.begin_optimistic("mark_all_notifications_read", vec![key.clone()]);
        self.cache()
            .update::<Pages<Notification>, _>(&key, WriteSource::Optimistic, |pages| {
                for n in pages.iter_mut() {
                    n.read = true;
                }
            })?;

        let filters = [Filter::eq("user_id", viewer), Filter::eq("read", false)];
        let result = self
            .call(self.platform().rows.update("notifications", &filters, json!({ "read": true })))
            .await
            .map(|rows| rows.len());
        write.settle(self, result).await
    }
}
