//! Shared fixture: an in-process platform with a signed-in viewer, a few
//! profiles, one post, and counter triggers standing in for the database's.

#![allow(dead_code)]

use platform_client::{ChangeEvent, ChangeKind, Filter, MemoryPlatform, Platform, RowStore, Tables};
use query_cache::{CacheKey, Pages, QueryCache};
use serde_json::{json, Value};
use social_client::models::{Comment, CommentId, Post};
use social_client::{Config, SocialClient};
use std::time::Duration;
use uuid::Uuid;

pub struct Fixture {
    pub memory: MemoryPlatform,
    pub client: SocialClient,
    pub viewer: Uuid,
    pub owner: Uuid,
    pub jane: Uuid,
    pub bob: Uuid,
    pub post_id: Uuid,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let memory = MemoryPlatform::new();
        install_counters(&memory);
        memory.set_unique("post_likes", &["post_id", "user_id"]);
        memory.set_unique("comment_likes", &["comment_id", "user_id"]);

        let (viewer, owner, jane, bob) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        memory.seed(
            "profiles",
            vec![
                profile(viewer, "viewer", "Vera Viewer"),
                profile(owner, "owner", "Olga Owner"),
                profile(jane, "Jane", "Jane Doe"),
                profile(bob, "bob", "Bob"),
            ],
        );

        let post_id = Uuid::new_v4();
        memory.seed(
            "posts",
            vec![json!({
                "id": post_id,
                "user_id": owner,
                "content": "First day on campus",
                "media_urls": [],
                "media_types": [],
                "like_count": 0,
                "comment_count": 0,
            })],
        );

        memory.sign_in_as(viewer, "viewer@school.test");
        let client = SocialClient::new(
            Platform::from_backend(memory.clone()),
            QueryCache::new(),
            config,
        );

        Self {
            memory,
            client,
            viewer,
            owner,
            jane,
            bob,
            post_id,
        }
    }

    /// Seed a comment on the fixture post and keep the post's count in step
    pub async fn seed_comment(&self, user_id: Uuid, text: &str, like_count: i64, parent: Option<&CommentId>) -> CommentId {
        let rows = self.memory.seed(
            "comments",
            vec![json!({
                "post_id": self.post_id,
                "user_id": user_id,
                "parent_comment_id": parent,
                "text": text,
                "like_count": like_count,
            })],
        );
        let count = self.post_row()["comment_count"].as_i64().unwrap_or(0);
        self.memory
            .update(
                "posts",
                &[Filter::eq("id", self.post_id)],
                json!({ "comment_count": count + 1 }),
            )
            .await
            .unwrap();
        CommentId::new(rows[0]["id"].as_str().unwrap())
    }

    pub fn post_row(&self) -> Value {
        self.memory
            .rows("posts")
            .into_iter()
            .find(|p| p["id"] == json!(self.post_id))
            .unwrap()
    }

    pub fn cached_comments(&self) -> Vec<Comment> {
        self.client
            .cache()
            .get::<Pages<Comment>>(&CacheKey::comments(self.post_id))
            .unwrap()
            .map(Pages::into_flat)
            .unwrap_or_default()
    }

    pub fn cached_comment(&self, id: &CommentId) -> Comment {
        self.cached_comments()
            .into_iter()
            .find(|c| &c.id == id)
            .unwrap()
    }

    pub fn cached_post(&self) -> Post {
        self.client
            .cache()
            .get(&CacheKey::post(self.post_id))
            .unwrap()
            .unwrap()
    }

    pub fn notifications_of(&self, user_id: Uuid, kind: &str) -> Vec<Value> {
        self.memory
            .rows("notifications")
            .into_iter()
            .filter(|n| n["user_id"] == json!(user_id) && n["type"] == kind)
            .collect()
    }
}

pub fn config_with(f: impl FnOnce(&mut Config)) -> Config {
    let mut config = Config::default();
    f(&mut config);
    config
}

fn profile(id: Uuid, username: &str, display_name: &str) -> Value {
    json!({
        "id": id,
        "username": username,
        "display_name": display_name,
        "avatar_url": null,
    })
}

/// Counters the database maintains with row triggers
pub fn install_counters(memory: &MemoryPlatform) {
    memory.add_trigger("comments", counter("posts", "post_id", "comment_count"));
    memory.add_trigger("post_likes", counter("posts", "post_id", "like_count"));
    memory.add_trigger("comment_likes", counter("comments", "comment_id", "like_count"));
}

fn counter(
    target: &'static str,
    foreign_key: &'static str,
    column: &'static str,
) -> impl Fn(&mut Tables, &ChangeEvent) + Send + Sync + 'static {
    move |tables, event| {
        let delta = match event.kind {
            ChangeKind::Insert => 1,
            ChangeKind::Delete => -1,
            ChangeKind::Update => return,
        };
        let Some(id) = event.record().get(foreign_key).cloned() else {
            return;
        };
        if let Some(rows) = tables.get_mut(target) {
            for row in rows.iter_mut().filter(|r| r.get("id") == Some(&id)) {
                let current = row.get(column).and_then(Value::as_i64).unwrap_or(0);
                row[column] = json!((current + delta).max(0));
            }
        }
    }
}

/// Poll until `check` holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
