//! Paginated loaders
//!
//! Each list the app shows is a [`PageSource`]: a cache key, a page size and
//! a fetch for one page at a cursor. The generic operations on
//! [`SocialClient`] handle caching:
//!
//! - `load_first` returns fresh cached pages or fetches page one
//! - `load_more` appends the next page, and issues no request after a short page
//! - `refetch` reloads as many pages as are cached and replaces the entry
//!
//! Every fetch commits through a [`query_cache::FetchTicket`], so a result
//! whose key was cancelled while in flight is dropped on arrival.

mod chat;
mod comments;
mod enrich;
mod notifications;
mod posts;

pub(crate) use enrich::enrich_chat;
pub use chat::ChatSource;
pub use comments::CommentsSource;
pub use notifications::NotificationsSource;
pub use posts::{FeedSource, UserPostsSource};

use crate::client::SocialClient;
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use query_cache::{Cursor, Page, Pages};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// One paginated list
#[async_trait]
pub trait PageSource: Send + Sync {
    type Row: Serialize + DeserializeOwned + Clone + Send + Sync;

    fn key(&self) -> String;

    /// Identity of a row, for dropping rows a later page repeats
    fn row_id(row: &Self::Row) -> String;

    fn page_size(&self, client: &SocialClient) -> usize;

    /// Fetch the page at `cursor` (`None` for the first page)
    async fn fetch(
        &self,
        client: &SocialClient,
        cursor: Option<Cursor>,
    ) -> ClientResult<Page<Self::Row>>;
}

impl SocialClient {
    /// Cached pages when present and fresh, otherwise the first page
    pub async fn load_first<S: PageSource>(&self, source: &S) -> ClientResult<Pages<S::Row>> {
        let key = source.key();
        if !self.cache().is_stale(&key) {
            if let Some(pages) = self.cache().get::<Pages<S::Row>>(&key)? {
                return Ok(pages);
            }
        }

        let page_size = source.page_size(self);
        let ticket = self.cache().begin_fetch(&key);
        let page = source.fetch(self, None).await?;
        let pages = Pages::first(page, page_size);

        if !self.cache().commit_fetch(&ticket, &pages)? {
            return Ok(self.cache().get(&key)?.unwrap_or(pages));
        }
        Ok(pages)
    }

    /// Append the next page
    ///
    /// Without cached pages this is `load_first`. After the last page it
    /// returns the cached pages without a request.
    pub async fn load_more<S: PageSource>(&self, source: &S) -> ClientResult<Pages<S::Row>> {
        let key = source.key();
        let Some(cached) = self.cache().get::<Pages<S::Row>>(&key)? else {
            return self.load_first(source).await;
        };
        let Some(cursor) = cached.next_cursor() else {
            debug!(key = %key, "No more pages");
            return Ok(cached);
        };

        let ticket = self.cache().begin_fetch(&key);
        let page = source.fetch(self, Some(cursor)).await?;

        let committed = self.cache().commit_fetch_with(&ticket, |existing: Option<Pages<S::Row>>| {
            let mut pages = existing.unwrap_or(cached);
            // Someone else already appended this page
            if pages.next_cursor() == Some(cursor) {
                let repeated = pages.push_distinct(page, S::row_id);
                if repeated > 0 {
                    debug!(key = %key, repeated, "Dropped rows already cached");
                }
            }
            pages
        })?;

        match committed {
            Some(pages) => Ok(pages),
            None => Ok(self.cache().get(&key)?.unwrap_or_default()),
        }
    }

    /// Reload every cached page and replace the entry wholesale
    pub async fn refetch<S: PageSource>(&self, source: &S) -> ClientResult<Pages<S::Row>> {
        let key = source.key();
        let page_size = source.page_size(self);
        let wanted = self
            .cache()
            .get::<Pages<S::Row>>(&key)?
            .map(|p| p.pages.len())
            .unwrap_or(0)
            .max(1);

        let ticket = self.cache().begin_fetch(&key);
        let mut pages = Pages::new(page_size);
        let mut cursor = None;
        for _ in 0..wanted {
            let page = source.fetch(self, cursor).await?;
            cursor = page.next_cursor;
            pages.push(page);
            if cursor.is_none() {
                break;
            }
        }

        debug!(key = %key, pages = pages.pages.len(), rows = pages.len(), "Refetched");
        if !self.cache().commit_fetch(&ticket, &pages)? {
            return Ok(self.cache().get(&key)?.unwrap_or(pages));
        }
        Ok(pages)
    }

    /// Refetch whatever list or post `key` names
    pub async fn refetch_key(&self, key: &str) -> ClientResult<()> {
        let parts: Vec<&str> = key.split(':').collect();
        match parts.as_slice() {
            [_, "posts", "feed"] => {
                self.refetch(&FeedSource).await?;
            }
            [_, "posts", "user", id] => {
                self.refetch(&UserPostsSource::new(parse_id(key, id)?)).await?;
            }
            [_, "post", id] => {
                self.refetch_post(parse_id(key, id)?).await?;
            }
            [_, "comments", id] => {
                self.refetch(&CommentsSource::new(parse_id(key, id)?)).await?;
            }
            [_, "chat", id] => {
                self.refetch(&ChatSource::new(parse_id(key, id)?)).await?;
            }
            [_, "notifications", id] => {
                self.refetch(&NotificationsSource::new(parse_id(key, id)?))
                    .await?;
            }
            _ => {
                return Err(ClientError::InvalidData(format!(
                    "no loader for cache key {}",
                    key
                )))
            }
        }
        Ok(())
    }

    /// Refetch each key that is cached; failures are logged, not returned
    pub(crate) async fn reconcile(&self, keys: &[String]) {
        for key in keys {
            if !self.cache().contains_key(key) {
                continue;
            }
            self.cache().invalidate(key);
            if let Err(e) = self.refetch_key(key).await {
                warn!(key = %key, error = %e, "Refetch after mutation failed");
            }
        }
    }
}

fn parse_id(key: &str, raw: &str) -> ClientResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| ClientError::InvalidData(format!("bad id in cache key {}", key)))
}

/// Decode platform rows, skipping (and logging) rows that do not fit the model
pub(crate) fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(table = %table, error = %e, "Skipping malformed row");
                None
            }
        })
        .collect()
}

/// Page of raw rows decoded into `T`; the cursor was computed from the raw rows
pub(crate) fn decode_page<T: DeserializeOwned>(table: &str, page: Page<Value>) -> Page<T> {
    Page {
        rows: decode_rows(table, page.rows),
        next_cursor: page.next_cursor,
    }
}

/// Offset window for a page
pub(crate) fn offset_of(cursor: Option<Cursor>) -> usize {
    match cursor {
        Some(Cursor::Offset(offset)) => offset,
        _ => 0,
    }
}

/// Creation time of the last row, the cursor of timestamp-paged lists
pub(crate) fn last_created_at(rows: &[Value]) -> Option<Cursor> {
    let raw = rows.last()?.get("created_at")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| Cursor::Timestamp(t.with_timezone(&Utc)))
}
