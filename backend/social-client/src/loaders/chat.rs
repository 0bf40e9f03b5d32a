use super::{decode_page, enrich, last_created_at, PageSource};
use crate::client::SocialClient;
use crate::error::ClientResult;
use crate::models::ChatMessage;
use async_trait::async_trait;
use platform_client::Query;
use query_cache::{CacheKey, Cursor, Page};
use uuid::Uuid;

/// Messages of one room, oldest first, paged by last-seen timestamp
#[derive(Debug, Clone, Copy)]
pub struct ChatSource {
    pub room_id: Uuid,
}

impl ChatSource {
    pub fn new(room_id: Uuid) -> Self {
        Self { room_id }
    }
}

#[async_trait]
impl PageSource for ChatSource {
    type Row = ChatMessage;

    fn key(&self) -> String {
        CacheKey::chat(self.room_id)
    }

    fn row_id(row: &ChatMessage) -> String {
        row.id.to_string()
    }

    fn page_size(&self, client: &SocialClient) -> usize {
        client.config().pages.chat
    }

    async fn fetch(
        &self,
        client: &SocialClient,
        cursor: Option<Cursor>,
    ) -> ClientResult<Page<ChatMessage>> {
        let page_size = self.page_size(client);
        let mut query = Query::table("chat_messages")
            .eq("room_id", self.room_id)
            .order("created_at", true)
            .limit(page_size);
        if let Some(Cursor::Timestamp(after)) = cursor {
            query = query.gt("created_at", after);
        }

        let rows = client.call(client.platform().rows.select(&query)).await?;
        let page = Page::from_fetch(rows, page_size, last_created_at);

        let mut page: Page<ChatMessage> = decode_page("chat_messages", page);
        enrich::enrich_chat(client, &mut page.rows).await;
        Ok(page)
    }
}
