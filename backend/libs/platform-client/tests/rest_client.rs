//! HTTP client tests against a mock platform

use platform_client::{
    AuthApi, ChannelSpec, Filter, ObjectStore, PlatformError, Query, Realtime, RestClient,
    RestConfig, RowStore,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> RestClient {
    RestClient::new(RestConfig {
        base_url: server.uri(),
        anon_key: "anon-key".to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

// ==================== Rows ====================

#[tokio::test]
async fn test_select_renders_postgrest_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/comments"))
        .and(query_param("select", "*"))
        .and(query_param("post_id", "eq.p1"))
        .and(query_param("order", "created_at.asc"))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "20"))
        .and(header("apikey", "anon-key"))
        .and(header("Authorization", "Bearer anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "c1"}])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = client(&server)
        .select(
            &Query::table("comments")
                .eq("post_id", "p1")
                .order("created_at", true)
                .range(0, 19),
        )
        .await
        .unwrap();
    assert_eq!(rows, vec![json!({"id": "c1"})]);
}

#[tokio::test]
async fn test_insert_publishes_to_local_hub() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/chat_messages"))
        .and(header("Prefer", "return=representation"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([{"id": "m1", "room_id": "r1", "body": "hi"}])),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let mut sub = client
        .subscribe(ChannelSpec::filtered(
            "chat:r1",
            "chat_messages",
            Filter::eq("room_id", "r1"),
        ))
        .unwrap();

    client
        .insert("chat_messages", vec![json!({"room_id": "r1", "body": "hi"})])
        .await
        .unwrap();
    let event = sub.recv().await.unwrap();
    assert_eq!(event.new["id"], "m1");
}

#[tokio::test]
async fn test_error_keeps_platform_message() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/comments"))
        .and(query_param("id", "eq.c1"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({"message": "permission denied for table comments"})),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .delete("comments", &[Filter::eq("id", "c1")])
        .await
        .unwrap_err();
    match err {
        PlatformError::Api { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "permission denied for table comments");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_rpc_posts_params() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/get_leaderboard"))
        .and(body_json(json!({"limit_count": 10})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"user_id": "u", "score": 3}])))
        .mount(&server)
        .await;

    let value = client(&server)
        .rpc("get_leaderboard", json!({"limit_count": 10}))
        .await
        .unwrap();
    assert_eq!(value[0]["score"], 3);
}

// ==================== Storage ====================

#[tokio::test]
async fn test_upload_and_remove() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/media/comments/p/u-1.png"))
        .and(header("Content-Type", "image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "media/comments/p/u-1.png"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/storage/v1/object/media"))
        .and(body_json(json!({"prefixes": ["comments/p/u-1.png"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let stored = client
        .upload("media", "comments/p/u-1.png", vec![0x89, 0x50], "image/png")
        .await
        .unwrap();
    let url = client.public_url("media", &stored);
    let path = client.path_from_public_url("media", &url).unwrap();
    client.remove("media", &[path]).await.unwrap();
}

// ==================== Auth ====================

#[tokio::test]
async fn test_sign_in_switches_bearer_token() {
    let server = MockServer::start().await;
    let user_id = uuid::Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "user-token",
            "refresh_token": "refresh",
            "expires_in": 3600,
            "user": {"id": user_id, "email": "jane@school.edu"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/notifications"))
        .and(header("Authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let session = client
        .sign_in_with_password("jane@school.edu", "secret")
        .await
        .unwrap();
    assert_eq!(session.user.id, user_id);
    assert!(session.expires_at.is_some());

    client
        .select(&Query::table("notifications"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_invalid_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client
        .sign_in_with_password("jane@school.edu", "wrong")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid login credentials");
    assert!(client.session().is_none());
}

#[tokio::test]
async fn test_update_password_requires_session() {
    let server = MockServer::start().await;
    let err = client(&server).update_password("new").await.unwrap_err();
    assert!(matches!(err, PlatformError::NotAuthenticated));
}
