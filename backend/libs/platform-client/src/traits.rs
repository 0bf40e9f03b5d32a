//! Interfaces of the hosted platform
//!
//! The client core only talks to the platform through these traits, so the
//! HTTP client and the in-process platform are interchangeable.

use crate::{PlatformResult, Query};
use crate::query::Filter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// Row operations and remote procedures
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, query: &Query) -> PlatformResult<Vec<Value>>;

    /// Insert rows, returning them as stored (generated ids and timestamps)
    async fn insert(&self, table: &str, rows: Vec<Value>) -> PlatformResult<Vec<Value>>;

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> PlatformResult<Vec<Value>>;

    /// Delete matching rows, returning the deleted rows
    async fn delete(&self, table: &str, filters: &[Filter]) -> PlatformResult<Vec<Value>>;

    async fn rpc(&self, name: &str, params: Value) -> PlatformResult<Value>;
}

/// Object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload bytes under `path`, returning the stored path
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> PlatformResult<String>;

    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn remove(&self, bucket: &str, paths: &[String]) -> PlatformResult<()>;

    /// Object path inside `bucket` for one of this store's public URLs
    fn path_from_public_url(&self, bucket: &str, url: &str) -> Option<String> {
        let marker = format!("/object/public/{}/", bucket);
        let start = url.find(&marker)? + marker.len();
        let path = url[start..].split(['?', '#']).next()?;
        if path.is_empty() {
            return None;
        }
        urlencoding::decode(path).ok().map(|p| p.into_owned())
    }
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Row change delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    /// Row after the change (`Null` for deletes)
    pub new: Value,
    /// Row before the change when known (`Null` for inserts)
    pub old: Value,
}

impl ChangeEvent {
    pub fn insert(table: &str, row: Value) -> Self {
        Self {
            table: table.to_string(),
            kind: ChangeKind::Insert,
            new: row,
            old: Value::Null,
        }
    }

    pub fn update(table: &str, row: Value, old: Value) -> Self {
        Self {
            table: table.to_string(),
            kind: ChangeKind::Update,
            new: row,
            old,
        }
    }

    pub fn delete(table: &str, old: Value) -> Self {
        Self {
            table: table.to_string(),
            kind: ChangeKind::Delete,
            new: Value::Null,
            old,
        }
    }

    /// The row this event is about
    pub fn record(&self) -> &Value {
        match self.kind {
            ChangeKind::Delete => &self.old,
            _ => &self.new,
        }
    }
}

/// Channel scoped to one table and optionally one partition value
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub name: String,
    pub table: String,
    pub filter: Option<Filter>,
}

impl ChannelSpec {
    pub fn table(name: impl Into<String>, table: &str) -> Self {
        Self {
            name: name.into(),
            table: table.to_string(),
            filter: None,
        }
    }

    pub fn filtered(name: impl Into<String>, table: &str, filter: Filter) -> Self {
        Self {
            name: name.into(),
            table: table.to_string(),
            filter: Some(filter),
        }
    }

    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        match &self.filter {
            Some(filter) => filter.matches(event.record()),
            None => true,
        }
    }
}

/// Live subscription; the platform side is released on drop
pub struct Subscription {
    channel: String,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(channel: String, events: mpsc::UnboundedReceiver<ChangeEvent>, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            channel,
            events,
            release: Some(Box::new(release)),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next event, `None` once the platform closed the channel
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish()
    }
}

/// Realtime change feed
pub trait Realtime: Send + Sync {
    fn subscribe(&self, spec: ChannelSpec) -> PlatformResult<Subscription>;
}

/// Authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Active session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: AuthUser,
}

/// Auth state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    PasswordRecoveryRequested { email: String },
    UserUpdated,
}

/// Authentication
#[async_trait]
pub trait AuthApi: Send + Sync {
    fn session(&self) -> Option<Session>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PlatformResult<Session>;

    /// Register a user; a session is returned when the platform signs in immediately
    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> PlatformResult<Option<Session>>;

    async fn sign_out(&self) -> PlatformResult<()>;

    async fn reset_password_for_email(&self, email: &str, redirect_to: Option<&str>) -> PlatformResult<()>;

    async fn update_password(&self, new_password: &str) -> PlatformResult<()>;

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Every platform capability behind one cloneable handle
#[derive(Clone)]
pub struct Platform {
    pub rows: Arc<dyn RowStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub realtime: Arc<dyn Realtime>,
    pub auth: Arc<dyn AuthApi>,
}

impl Platform {
    /// Use one implementation for every capability
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: RowStore + ObjectStore + Realtime + AuthApi + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            rows: backend.clone(),
            storage: backend.clone(),
            realtime: backend.clone(),
            auth: backend,
        }
    }

    /// Current user id, if signed in
    pub fn current_user_id(&self) -> Option<Uuid> {
        self.auth.session().map(|s| s.user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Urls;

    #[async_trait]
    impl ObjectStore for Urls {
        async fn upload(&self, _: &str, path: &str, _: Vec<u8>, _: &str) -> PlatformResult<String> {
            Ok(path.to_string())
        }

        fn public_url(&self, bucket: &str, path: &str) -> String {
            format!("https://x.test/storage/v1/object/public/{}/{}", bucket, path)
        }

        async fn remove(&self, _: &str, _: &[String]) -> PlatformResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_path_from_public_url() {
        let url = Urls.public_url("media", "comments/p/u-1.png");
        assert_eq!(
            Urls.path_from_public_url("media", &url),
            Some("comments/p/u-1.png".to_string())
        );
        assert_eq!(
            Urls.path_from_public_url("media", "https://x.test/storage/v1/object/public/media/a%20b.png?t=1"),
            Some("a b.png".to_string())
        );
        assert_eq!(Urls.path_from_public_url("post_media", &url), None);
    }

    #[test]
    fn test_channel_filter_uses_old_row_for_deletes() {
        let spec = ChannelSpec::filtered("comments:p", "comments", Filter::eq("post_id", "p"));
        assert!(spec.accepts(&ChangeEvent::insert("comments", json!({"post_id": "p"}))));
        assert!(spec.accepts(&ChangeEvent::delete("comments", json!({"post_id": "p"}))));
        assert!(!spec.accepts(&ChangeEvent::insert("comments", json!({"post_id": "q"}))));
        assert!(!spec.accepts(&ChangeEvent::insert("posts", json!({"post_id": "p"}))));
    }

    #[test]
    fn test_subscription_release_runs_once_on_drop() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let released = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel();
        let counter = released.clone();
        let sub = Subscription::new("c".to_string(), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
