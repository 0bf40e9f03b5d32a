//! Integration tests for the realtime bridge over the in-process platform

use platform_client::{ChangeEvent, ChannelSpec, Filter, MemoryPlatform, RowStore};
use query_cache::{CacheKey, Cursor, Page, Pages, QueryCache, WriteSource};
use realtime_bridge::{Placement, RealtimeBridge, SyncPolicy, WatchSpec};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

fn cached_ids(cache: &QueryCache, key: &str) -> Vec<String> {
    cache
        .get::<Pages<Value>>(key)
        .unwrap()
        .map(|pages| {
            pages
                .iter()
                .map(|r| r["id"].as_str().unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn seed_pages(cache: &QueryCache, key: &str, rows: Vec<Value>) {
    let page = Page {
        rows,
        next_cursor: None::<Cursor>,
    };
    cache
        .set(key, &Pages::first(page, 30), WriteSource::Fetch)
        .unwrap();
}

fn chat_spec(room: Uuid, placement: Placement) -> WatchSpec {
    WatchSpec {
        key: CacheKey::chat(room),
        channel: ChannelSpec::filtered(
            format!("chat:{}", room),
            "chat_messages",
            Filter::eq("room_id", room),
        ),
        policy: SyncPolicy::merge(placement),
    }
}

// ==================== Merge Policy ====================

#[tokio::test]
async fn test_duplicate_delivery_does_not_duplicate_row() {
    let platform = MemoryPlatform::new();
    let cache = QueryCache::new();
    let bridge = RealtimeBridge::new(Arc::new(platform.clone()), cache.clone());
    let room = Uuid::new_v4();
    let key = CacheKey::chat(room);
    seed_pages(&cache, &key, vec![json!({"id": "m0", "room_id": room})]);

    let _watch = bridge.watch(chat_spec(room, Placement::Append)).unwrap();

    let event = ChangeEvent::insert(
        "chat_messages",
        json!({"id": "m1", "room_id": room, "body": "hi"}),
    );
    assert_eq!(platform.emit(event.clone()), 1);
    assert_eq!(platform.emit(event), 1);

    assert!(eventually(|| cached_ids(&cache, &key) == vec!["m0", "m1"]).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cached_ids(&cache, &key), vec!["m0", "m1"]);
}

#[tokio::test]
async fn test_inserted_rows_pass_through_enrich_hook() {
    let platform = MemoryPlatform::new();
    let cache = QueryCache::new();
    let bridge = RealtimeBridge::new(Arc::new(platform.clone()), cache.clone());
    let room = Uuid::new_v4();
    let key = CacheKey::chat(room);
    seed_pages(&cache, &key, vec![]);

    let mut spec = chat_spec(room, Placement::Append);
    spec.policy = SyncPolicy::merge_enriched(Placement::Append, |mut row: Value| async move {
        row["sender"] = json!({ "username": "jane" });
        row
    });
    let _watch = bridge.watch(spec).unwrap();

    platform.emit(ChangeEvent::insert(
        "chat_messages",
        json!({"id": "m1", "room_id": room, "body": "hi"}),
    ));

    assert!(eventually(|| cached_ids(&cache, &key) == vec!["m1"]).await);
    let pages: Pages<Value> = cache.get(&key).unwrap().unwrap();
    assert_eq!(pages.iter().next().unwrap()["sender"]["username"], "jane");
}

#[tokio::test]
async fn test_other_partitions_are_not_merged() {
    let platform = MemoryPlatform::new();
    let cache = QueryCache::new();
    let bridge = RealtimeBridge::new(Arc::new(platform.clone()), cache.clone());
    let room = Uuid::new_v4();
    let key = CacheKey::chat(room);
    seed_pages(&cache, &key, vec![]);

    let _watch = bridge.watch(chat_spec(room, Placement::Append)).unwrap();
    platform
        .insert(
            "chat_messages",
            vec![json!({"id": "other", "room_id": Uuid::new_v4()})],
        )
        .await
        .unwrap();
    platform
        .insert("chat_messages", vec![json!({"id": "mine", "room_id": room})])
        .await
        .unwrap();

    assert!(eventually(|| cached_ids(&cache, &key) == vec!["mine"]).await);
}

// ==================== Invalidate Policy ====================

#[tokio::test]
async fn test_invalidate_policy_runs_refetch() {
    let platform = MemoryPlatform::new();
    let cache = QueryCache::new();
    let bridge = RealtimeBridge::new(Arc::new(platform.clone()), cache.clone());
    let post = Uuid::new_v4();
    let key = CacheKey::comments(post);
    seed_pages(&cache, &key, vec![]);

    let refetches = Arc::new(AtomicUsize::new(0));
    let counter = refetches.clone();
    let _watch = bridge
        .watch(WatchSpec {
            key: key.clone(),
            channel: ChannelSpec::filtered(
                format!("comments:{}", post),
                "comments",
                Filter::eq("post_id", post),
            ),
            policy: SyncPolicy::invalidate(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        })
        .unwrap();

    platform
        .insert("comments", vec![json!({"post_id": post, "text": "new"})])
        .await
        .unwrap();

    assert!(eventually(|| refetches.load(Ordering::SeqCst) == 1).await);
    assert!(cache.is_stale(&key));
}

// ==================== Lifecycle ====================

#[tokio::test]
async fn test_dropping_handle_releases_subscription() {
    let platform = MemoryPlatform::new();
    let cache = QueryCache::new();
    let bridge = RealtimeBridge::new(Arc::new(platform.clone()), cache);
    let room = Uuid::new_v4();

    let watch = bridge.watch(chat_spec(room, Placement::Append)).unwrap();
    assert_eq!(platform.realtime_hub().subscriber_count(), 1);
    assert!(bridge.is_watching(&CacheKey::chat(room)));

    drop(watch);
    assert!(!bridge.is_watching(&CacheKey::chat(room)));
    assert!(eventually(|| platform.realtime_hub().subscriber_count() == 0).await);
}

#[tokio::test]
async fn test_rewatch_replaces_previous_watch() {
    let platform = MemoryPlatform::new();
    let cache = QueryCache::new();
    let bridge = RealtimeBridge::new(Arc::new(platform.clone()), cache.clone());
    let room = Uuid::new_v4();
    let key = CacheKey::chat(room);
    seed_pages(&cache, &key, vec![]);

    let first = bridge.watch(chat_spec(room, Placement::Append)).unwrap();
    let second = bridge.watch(chat_spec(room, Placement::Append)).unwrap();
    assert_eq!(bridge.active_watches(), 1);
    assert!(eventually(|| platform.realtime_hub().subscriber_count() == 1).await);

    // The stale handle going away must not unregister the live watch
    drop(first);
    assert!(bridge.is_watching(&key));

    platform.emit(ChangeEvent::insert(
        "chat_messages",
        json!({"id": "m1", "room_id": room}),
    ));
    assert!(eventually(|| cached_ids(&cache, &key) == vec!["m1"]).await);
    assert!(second.is_active());
}
