use super::{decode_page, last_created_at, PageSource};
use crate::client::SocialClient;
use crate::error::ClientResult;
use crate::models::Notification;
use async_trait::async_trait;
use platform_client::Query;
use query_cache::{CacheKey, Cursor, Page};
use uuid::Uuid;

/// Notifications of one user, newest first, paged by last-seen timestamp
#[derive(Debug, Clone, Copy)]
pub struct NotificationsSource {
    pub user_id: Uuid,
}

impl NotificationsSource {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }
}

#[async_trait]
impl PageSource for NotificationsSource {
    type Row = Notification;

    fn key(&self) -> String {
        CacheKey::notifications(self.user_id)
    }

    fn row_id(row: &Notification) -> String {
        row.id.to_string()
    }

    fn page_size(&self, client: &SocialClient) -> usize {
        client.config().pages.notifications
    }

    async fn fetch(
        &self,
        client: &SocialClient,
        cursor: Option<Cursor>,
    ) -> ClientResult<Page<Notification>> {
        let page_size = self.page_size(client);
        let mut query = Query::table("notifications")
            .eq("user_id", self.user_id)
            .order("created_at", false)
            .limit(page_size);
        if let Some(Cursor::Timestamp(before)) = cursor {
            query = query.lt("created_at", before);
        }

        let rows = client.call(client.platform().rows.select(&query)).await?;
        let page = Page::from_fetch(rows, page_size, last_created_at);
        Ok(decode_page("notifications", page))
    }
}
