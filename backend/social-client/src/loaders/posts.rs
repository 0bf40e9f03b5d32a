use super::{decode_page, decode_rows, enrich, offset_of, PageSource};
use crate::client::SocialClient;
use crate::error::{ClientError, ClientResult};
use crate::models::Post;
use async_trait::async_trait;
use platform_client::Query;
use query_cache::{CacheKey, Cursor, Page};
use tracing::{debug, warn};
use uuid::Uuid;

/// Home feed, newest first
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedSource;

/// One user's posts, newest first
#[derive(Debug, Clone, Copy)]
pub struct UserPostsSource {
    pub user_id: Uuid,
}

impl UserPostsSource {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }
}

#[async_trait]
impl PageSource for FeedSource {
    type Row = Post;

    fn key(&self) -> String {
        CacheKey::feed()
    }

    fn row_id(row: &Post) -> String {
        row.id.to_string()
    }

    fn page_size(&self, client: &SocialClient) -> usize {
        client.config().pages.feed
    }

    async fn fetch(&self, client: &SocialClient, cursor: Option<Cursor>) -> ClientResult<Page<Post>> {
        fetch_posts(client, Query::table("posts"), self.page_size(client), cursor).await
    }
}

#[async_trait]
impl PageSource for UserPostsSource {
    type Row = Post;

    fn key(&self) -> String {
        CacheKey::user_posts(self.user_id)
    }

    fn row_id(row: &Post) -> String {
        row.id.to_string()
    }

    fn page_size(&self, client: &SocialClient) -> usize {
        client.config().pages.feed
    }

    async fn fetch(&self, client: &SocialClient, cursor: Option<Cursor>) -> ClientResult<Page<Post>> {
        let query = Query::table("posts").eq("user_id", self.user_id);
        fetch_posts(client, query, self.page_size(client), cursor).await
    }
}

async fn fetch_posts(
    client: &SocialClient,
    query: Query,
    page_size: usize,
    cursor: Option<Cursor>,
) -> ClientResult<Page<Post>> {
    let offset = offset_of(cursor);
    let query = query
        .order("created_at", false)
        .range(offset, offset + page_size - 1);

    let rows = client.call(client.platform().rows.select(&query)).await?;
    let page = Page::from_fetch(rows, page_size, |rows| {
        Some(Cursor::Offset(offset + rows.len()))
    });

    let mut page: Page<Post> = decode_page("posts", page);
    page.rows.retain(|post| match post.validate_media() {
        Ok(()) => true,
        Err(e) => {
            warn!(post_id = %post.id, error = %e, "Skipping post with inconsistent media");
            false
        }
    });
    enrich::enrich_posts(client, &mut page.rows).await?;

    debug!(offset, rows = page.rows.len(), last = page.is_last(), "Fetched posts page");
    Ok(page)
}

impl SocialClient {
    /// Single post, from cache when fresh
    pub async fn load_post(&self, post_id: Uuid) -> ClientResult<Post> {
        let key = CacheKey::post(post_id);
        if !self.cache().is_stale(&key) {
            if let Some(post) = self.cache().get::<Post>(&key)? {
                return Ok(post);
            }
        }
        self.refetch_post(post_id).await
    }

    pub(crate) async fn refetch_post(&self, post_id: Uuid) -> ClientResult<Post> {
        let key = CacheKey::post(post_id);
        let ticket = self.cache().begin_fetch(&key);

        let query = Query::table("posts").eq("id", post_id).limit(1);
        let rows = self.call(self.platform().rows.select(&query)).await?;
        let mut posts: Vec<Post> = decode_rows("posts", rows);
        let Some(mut post) = posts.pop() else {
            return Err(ClientError::NotFound(format!("post {}", post_id)));
        };
        post.validate_media()?;
        enrich::enrich_posts(self, std::slice::from_mut(&mut post)).await?;

        if !self.cache().commit_fetch(&ticket, &post)? {
            return Ok(self.cache().get(&key)?.unwrap_or(post));
        }
        Ok(post)
    }
}
