//! HTTP client for the hosted platform
//!
//! PostgREST-style rows at `/rest/v1`, storage at `/storage/v1`, auth at
//! `/auth/v1`. Every request carries the `apikey` header and a bearer token
//! (the session's access token, or the anon key when signed out).
//!
//! Realtime is served by a [`LocalRealtime`] hub fed by this client's own
//! writes.

use crate::query::Filter;
use crate::realtime::LocalRealtime;
use crate::traits::{
    AuthApi, AuthEvent, AuthUser, ChangeEvent, ChannelSpec, ObjectStore, Realtime, RowStore,
    Session, Subscription,
};
use crate::{PlatformError, PlatformResult, Query};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const AUTH_EVENT_CAPACITY: usize = 32;

/// Connection settings
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Project URL, e.g. `https://abc.platform.co`
    pub base_url: String,
    pub anon_key: String,
    pub timeout: Duration,
}

/// HTTP platform client
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    anon_key: String,
    session: Arc<RwLock<Option<Session>>>,
    auth_events: broadcast::Sender<AuthEvent>,
    realtime: LocalRealtime,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
            user: token.user,
        }
    }
}

impl RestClient {
    pub fn new(config: RestConfig) -> PlatformResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        let (auth_events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);

        info!(base_url = %config.base_url, "Platform client initialized");

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key,
            session: Arc::new(RwLock::new(None)),
            auth_events,
            realtime: LocalRealtime::new(),
        })
    }

    /// Hub carrying this client's own writes
    pub fn realtime_hub(&self) -> &LocalRealtime {
        &self.realtime
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> String {
        match self.session.read().as_ref() {
            Some(session) => format!("Bearer {}", session.access_token),
            None => format!("Bearer {}", self.anon_key),
        }
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer())
    }

    /// Send and decode a JSON body; an empty body decodes as `Null`
    async fn send(&self, request: RequestBuilder) -> PlatformResult<Value> {
        let response = self.authed(request).send().await.map_err(|e| {
            error!("Platform request failed: {}", e);
            PlatformError::from(e)
        })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&body)
                .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Unknown error")
                        .to_string()
                });
            warn!(status = status.as_u16(), message = %message, "Platform returned error");
            return Err(PlatformError::api(status.as_u16(), message));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_rows(&self, request: RequestBuilder) -> PlatformResult<Vec<Value>> {
        match self.send(request).await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    fn set_session(&self, session: Option<Session>) {
        *self.session.write() = session.clone();
        let event = match session {
            Some(session) => AuthEvent::SignedIn(session),
            None => AuthEvent::SignedOut,
        };
        let _ = self.auth_events.send(event);
    }
}

/// Pull a human-readable message out of a platform error body
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|field| value.get(field).and_then(Value::as_str))
        .map(str::to_string)
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(Filter::to_param).collect()
}

#[async_trait]
impl RowStore for RestClient {
    async fn select(&self, query: &Query) -> PlatformResult<Vec<Value>> {
        debug!(table = %query.table, "select");
        let request = self
            .http
            .get(self.url(&format!("/rest/v1/{}", query.table)))
            .query(&query.to_params());
        self.send_rows(request).await
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> PlatformResult<Vec<Value>> {
        debug!(table = %table, count = rows.len(), "insert");
        let request = self
            .http
            .post(self.url(&format!("/rest/v1/{}", table)))
            .header("Prefer", "return=representation")
            .json(&rows);
        let stored = self.send_rows(request).await?;

        for row in &stored {
            self.realtime.publish(&ChangeEvent::insert(table, row.clone()));
        }
        Ok(stored)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> PlatformResult<Vec<Value>> {
        debug!(table = %table, "update");
        let request = self
            .http
            .patch(self.url(&format!("/rest/v1/{}", table)))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(&patch);
        let stored = self.send_rows(request).await?;

        for row in &stored {
            self.realtime
                .publish(&ChangeEvent::update(table, row.clone(), Value::Null));
        }
        Ok(stored)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> PlatformResult<Vec<Value>> {
        debug!(table = %table, "delete");
        let request = self
            .http
            .delete(self.url(&format!("/rest/v1/{}", table)))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation");
        let deleted = self.send_rows(request).await?;

        for row in &deleted {
            self.realtime.publish(&ChangeEvent::delete(table, row.clone()));
        }
        Ok(deleted)
    }

    async fn rpc(&self, name: &str, params: Value) -> PlatformResult<Value> {
        debug!(function = %name, "rpc");
        let request = self
            .http
            .post(self.url(&format!("/rest/v1/rpc/{}", name)))
            .json(&params);
        self.send(request).await
    }
}

#[async_trait]
impl ObjectStore for RestClient {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> PlatformResult<String> {
        let size = bytes.len();
        let request = self
            .http
            .post(self.url(&format!("/storage/v1/object/{}/{}", bucket, path)))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.send(request).await?;

        info!(bucket = %bucket, path = %path, size, "Uploaded object");
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.url(&format!("/storage/v1/object/public/{}/{}", bucket, path))
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> PlatformResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let request = self
            .http
            .delete(self.url(&format!("/storage/v1/object/{}", bucket)))
            .json(&json!({ "prefixes": paths }));
        self.send(request).await?;

        info!(bucket = %bucket, count = paths.len(), "Removed objects");
        Ok(())
    }
}

impl Realtime for RestClient {
    fn subscribe(&self, spec: ChannelSpec) -> PlatformResult<Subscription> {
        self.realtime.subscribe(spec)
    }
}

#[async_trait]
impl AuthApi for RestClient {
    fn session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PlatformResult<Session> {
        let request = self
            .http
            .post(self.url("/auth/v1/token"))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let token: TokenResponse = serde_json::from_value(self.send(request).await?)?;
        let session = Session::from(token);

        info!(user_id = %session.user.id, "Signed in");
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> PlatformResult<Option<Session>> {
        let request = self
            .http
            .post(self.url("/auth/v1/signup"))
            .json(&json!({ "email": email, "password": password, "data": metadata }));
        let body = self.send(request).await?;

        // Without email confirmation the platform answers with a full token
        if body.get("access_token").is_some() {
            let session = Session::from(serde_json::from_value::<TokenResponse>(body)?);
            info!(user_id = %session.user.id, "Signed up and signed in");
            self.set_session(Some(session.clone()));
            return Ok(Some(session));
        }

        info!(email = %email, "Signed up, confirmation pending");
        Ok(None)
    }

    async fn sign_out(&self) -> PlatformResult<()> {
        let signed_in = self.session.read().is_some();
        if !signed_in {
            return Ok(());
        }
        let request = self.http.post(self.url("/auth/v1/logout"));
        let result = self.send(request).await;

        // Local session is dropped even if the server call failed
        self.set_session(None);
        result.map(|_| ())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: Option<&str>) -> PlatformResult<()> {
        let mut request = self
            .http
            .post(self.url("/auth/v1/recover"))
            .json(&json!({ "email": email }));
        if let Some(redirect) = redirect_to {
            request = request.query(&[("redirect_to", redirect)]);
        }
        self.send(request).await?;

        let _ = self.auth_events.send(AuthEvent::PasswordRecoveryRequested {
            email: email.to_string(),
        });
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> PlatformResult<()> {
        let signed_in = self.session.read().is_some();
        if !signed_in {
            return Err(PlatformError::NotAuthenticated);
        }
        let request = self
            .http
            .put(self.url("/auth/v1/user"))
            .json(&json!({ "password": new_password }));
        self.send(request).await?;

        let _ = self.auth_events.send(AuthEvent::UserUpdated);
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_fields() {
        assert_eq!(
            error_message(r#"{"message":"new row violates row-level security policy"}"#),
            Some("new row violates row-level security policy".to_string())
        );
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            Some("Invalid login credentials".to_string())
        );
        assert_eq!(error_message("not json"), None);
    }

    #[test]
    fn test_public_url_trims_trailing_slash() {
        let client = RestClient::new(RestConfig {
            base_url: "https://abc.platform.test/".to_string(),
            anon_key: "anon".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        let url = client.public_url("media", "comments/p/u-1.png");
        assert_eq!(
            url,
            "https://abc.platform.test/storage/v1/object/public/media/comments/p/u-1.png"
        );
        assert_eq!(
            client.path_from_public_url("media", &url),
            Some("comments/p/u-1.png".to_string())
        );
    }
}
