mod common;

use common::{config_with, eventually, Fixture};
use platform_client::{ChangeEvent, RowStore};
use query_cache::{CacheKey, Pages};
use serde_json::json;
use social_client::models::{ChatMessage, Notification};
use social_client::{ChatSource, CommentsSource, NotificationsSource};
use std::collections::HashSet;
use uuid::Uuid;

fn chat_rows(fx: &Fixture, room: Uuid) -> Vec<ChatMessage> {
    fx.client
        .cache()
        .get::<Pages<ChatMessage>>(&CacheKey::chat(room))
        .unwrap()
        .map(Pages::into_flat)
        .unwrap_or_default()
}

#[tokio::test]
async fn test_chat_messages_merge_at_the_tail() {
    let fx = Fixture::new().await;
    let room = Uuid::new_v4();
    fx.memory.seed(
        "chat_messages",
        vec![json!({ "room_id": room, "sender_id": fx.jane, "body": "hi" })],
    );
    fx.client.load_first(&ChatSource::new(room)).await.unwrap();
    let _watch = fx.client.watch_chat(room).unwrap();

    fx.client
        .platform()
        .rows
        .insert(
            "chat_messages",
            vec![json!({ "room_id": room, "sender_id": fx.viewer, "body": "hey" })],
        )
        .await
        .unwrap();

    assert!(eventually(|| chat_rows(&fx, room).len() == 2).await);
    let bodies: Vec<String> = chat_rows(&fx, room).into_iter().filter_map(|m| m.body).collect();
    assert_eq!(bodies, vec!["hi", "hey"]);
}

#[tokio::test]
async fn test_live_chat_message_carries_its_sender() {
    let fx = Fixture::new().await;
    let room = Uuid::new_v4();
    fx.client.load_first(&ChatSource::new(room)).await.unwrap();
    let _watch = fx.client.watch_chat(room).unwrap();

    fx.client
        .platform()
        .rows
        .insert(
            "chat_messages",
            vec![json!({ "room_id": room, "sender_id": fx.viewer, "body": "hey" })],
        )
        .await
        .unwrap();

    assert!(eventually(|| chat_rows(&fx, room).len() == 1).await);
    let sender = chat_rows(&fx, room).remove(0).sender.expect("sender attached on merge");
    assert_eq!(sender.id, fx.viewer);
    assert_eq!(sender.username.as_deref(), Some("viewer"));
}

#[tokio::test]
async fn test_live_message_waits_for_unloaded_pages() {
    let fx = Fixture::with_config(config_with(|c| c.pages.chat = 2)).await;
    let room = Uuid::new_v4();
    fx.memory.seed(
        "chat_messages",
        ["m1", "m2", "m3"]
            .iter()
            .map(|body| json!({ "room_id": room, "sender_id": fx.jane, "body": body }))
            .collect(),
    );
    let source = ChatSource::new(room);
    let first = fx.client.load_first(&source).await.unwrap();
    assert!(first.has_next_page());
    let _watch = fx.client.watch_chat(room).unwrap();

    fx.client
        .platform()
        .rows
        .insert(
            "chat_messages",
            vec![json!({ "room_id": room, "sender_id": fx.viewer, "body": "live" })],
        )
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(chat_rows(&fx, room).len(), 2, "older pages are still unloaded");

    fx.client.load_more(&source).await.unwrap();
    fx.client.load_more(&source).await.unwrap();

    let rows = chat_rows(&fx, room);
    let bodies: Vec<String> = rows.iter().filter_map(|m| m.body.clone()).collect();
    assert_eq!(bodies, vec!["m1", "m2", "m3", "live"]);
    let ids: HashSet<Uuid> = rows.iter().map(|m| m.id).collect();
    assert_eq!(ids.len(), rows.len());
}

#[tokio::test]
async fn test_duplicate_delivery_does_not_duplicate_rows() {
    let fx = Fixture::new().await;
    let room = Uuid::new_v4();
    fx.client.load_first(&ChatSource::new(room)).await.unwrap();
    let _watch = fx.client.watch_chat(room).unwrap();

    let row = json!({
        "id": Uuid::new_v4(),
        "room_id": room,
        "sender_id": fx.jane,
        "body": "once",
        "created_at": "2024-03-01T10:00:00Z",
    });
    fx.memory.emit(ChangeEvent::insert("chat_messages", row.clone()));
    fx.memory.emit(ChangeEvent::insert("chat_messages", row));

    assert!(eventually(|| chat_rows(&fx, room).len() == 1).await);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(chat_rows(&fx, room).len(), 1);
}

#[tokio::test]
async fn test_other_rooms_are_ignored() {
    let fx = Fixture::new().await;
    let (room, other) = (Uuid::new_v4(), Uuid::new_v4());
    fx.client.load_first(&ChatSource::new(room)).await.unwrap();
    let _watch = fx.client.watch_chat(room).unwrap();

    let delivered = fx.memory.emit(ChangeEvent::insert(
        "chat_messages",
        json!({ "id": Uuid::new_v4(), "room_id": other, "sender_id": fx.jane, "created_at": "2024-03-01T10:00:00Z" }),
    ));
    assert_eq!(delivered, 0);
    assert!(chat_rows(&fx, room).is_empty());
}

#[tokio::test]
async fn test_new_notifications_merge_at_the_head() {
    let fx = Fixture::new().await;
    fx.memory.seed(
        "notifications",
        vec![json!({ "user_id": fx.viewer, "type": "follow", "message": "older" })],
    );
    let source = NotificationsSource::new(fx.viewer);
    fx.client.load_first(&source).await.unwrap();
    let _watch = fx.client.watch_notifications().unwrap();

    fx.memory
        .insert(
            "notifications",
            vec![json!({ "user_id": fx.viewer, "type": "like", "message": "newer", "read": false })],
        )
        .await
        .unwrap();

    let key = CacheKey::notifications(fx.viewer);
    let cached = || {
        fx.client
            .cache()
            .get::<Pages<Notification>>(&key)
            .unwrap()
            .map(Pages::into_flat)
            .unwrap_or_default()
    };
    assert!(eventually(|| cached().len() == 2).await);
    assert_eq!(cached()[0].message.as_deref(), Some("newer"));
}

#[tokio::test]
async fn test_comment_changes_trigger_refetch() {
    let fx = Fixture::new().await;
    fx.client.load_first(&CommentsSource::new(fx.post_id)).await.unwrap();
    let _watch = fx.client.watch_comments(fx.post_id).unwrap();

    fx.memory
        .insert(
            "comments",
            vec![json!({ "post_id": fx.post_id, "user_id": fx.jane, "text": "from elsewhere" })],
        )
        .await
        .unwrap();

    assert!(eventually(|| fx.cached_comments().len() == 1).await);
    let comment = &fx.cached_comments()[0];
    assert_eq!(comment.text.as_deref(), Some("from elsewhere"));
    assert!(comment.author.is_some(), "refetch enriches the row");
}

#[tokio::test]
async fn test_dropping_the_watch_releases_the_subscription() {
    let fx = Fixture::new().await;
    let room = Uuid::new_v4();

    let watch = fx.client.watch_chat(room).unwrap();
    assert_eq!(fx.memory.realtime_hub().subscriber_count(), 1);
    assert!(fx.client.bridge().is_watching(&CacheKey::chat(room)));

    drop(watch);
    assert!(eventually(|| fx.memory.realtime_hub().subscriber_count() == 0).await);
    assert!(!fx.client.bridge().is_watching(&CacheKey::chat(room)));
}

#[tokio::test]
async fn test_rewatching_a_key_keeps_one_subscription() {
    let fx = Fixture::new().await;
    let room = Uuid::new_v4();

    let _first = fx.client.watch_chat(room).unwrap();
    let _second = fx.client.watch_chat(room).unwrap();

    assert!(eventually(|| fx.memory.realtime_hub().subscriber_count() == 1).await);
    assert_eq!(fx.client.bridge().active_watches(), 1);
}
