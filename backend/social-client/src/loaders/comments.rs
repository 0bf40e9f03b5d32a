use super::{decode_page, enrich, offset_of, PageSource};
use crate::client::SocialClient;
use crate::error::ClientResult;
use crate::models::Comment;
use crate::threads::{build_thread, CommentNode};
use async_trait::async_trait;
use platform_client::Query;
use query_cache::{CacheKey, Cursor, Page, Pages};
use tracing::debug;
use uuid::Uuid;

/// Comments of one post, oldest first
#[derive(Debug, Clone, Copy)]
pub struct CommentsSource {
    pub post_id: Uuid,
}

impl CommentsSource {
    pub fn new(post_id: Uuid) -> Self {
        Self { post_id }
    }
}

#[async_trait]
impl PageSource for CommentsSource {
    type Row = Comment;

    fn key(&self) -> String {
        CacheKey::comments(self.post_id)
    }

    fn row_id(row: &Comment) -> String {
        row.id.as_str().to_string()
    }

    fn page_size(&self, client: &SocialClient) -> usize {
        client.config().pages.comments
    }

    async fn fetch(
        &self,
        client: &SocialClient,
        cursor: Option<Cursor>,
    ) -> ClientResult<Page<Comment>> {
        let page_size = self.page_size(client);
        let offset = offset_of(cursor);
        let query = Query::table("comments")
            .eq("post_id", self.post_id)
            .order("created_at", true)
            .range(offset, offset + page_size - 1);

        let rows = client.call(client.platform().rows.select(&query)).await?;
        let page = Page::from_fetch(rows, page_size, |rows| {
            Some(Cursor::Offset(offset + rows.len()))
        });

        let mut page: Page<Comment> = decode_page("comments", page);
        enrich::enrich_comments(client, &mut page.rows).await?;

        debug!(post_id = %self.post_id, offset, rows = page.rows.len(), "Fetched comments page");
        Ok(page)
    }
}

impl SocialClient {
    /// Cached comments of a post as a reply forest
    pub fn comment_thread(&self, post_id: Uuid) -> ClientResult<Vec<CommentNode>> {
        let pages: Option<Pages<Comment>> = self.cache().get(&CacheKey::comments(post_id))?;
        Ok(build_thread(pages.map(Pages::into_flat).unwrap_or_default()))
    }
}
