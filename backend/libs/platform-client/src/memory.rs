//! In-process platform
//!
//! Implements every platform trait over JSON tables held in memory. Used by
//! tests and offline development. Besides plain storage it supports:
//! - failure injection per table, bucket or procedure ([`MemoryPlatform::fail_next`])
//! - holding the next call open to observe state mid-flight ([`MemoryPlatform::hold`])
//! - replaying realtime events ([`MemoryPlatform::emit`])
//! - a call log for asserting request counts
//!
//! Targets are table names, `storage:{bucket}` or `rpc:{name}`.

use crate::query::Filter;
use crate::realtime::LocalRealtime;
use crate::traits::{
    AuthApi, AuthEvent, AuthUser, ChangeEvent, ChannelSpec, ObjectStore, Realtime, RowStore,
    Session, Subscription,
};
use crate::{PlatformError, PlatformResult, Query};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;
use uuid::Uuid;

const MEMORY_BASE_URL: &str = "http://platform.local";
const AUTH_EVENT_CAPACITY: usize = 32;

/// Kind of recorded call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Select,
    Insert,
    Update,
    Delete,
    Rpc,
    Upload,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub kind: CallKind,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

type RpcHandler = Arc<dyn Fn(Value) -> PlatformResult<Value> + Send + Sync>;

/// Tables by name
pub type Tables = HashMap<String, Vec<Value>>;

type Trigger = Arc<dyn Fn(&mut Tables, &ChangeEvent) + Send + Sync>;

struct MemoryUser {
    id: Uuid,
    email: String,
    password: String,
}

struct PendingHold {
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Handle to a held call
///
/// The call blocks until [`HoldHandle::release`] is called or the handle is dropped.
pub struct HoldHandle {
    entered: Option<oneshot::Receiver<()>>,
    release: oneshot::Sender<()>,
}

impl HoldHandle {
    /// Wait until the held call has started
    pub async fn entered(&mut self) {
        if let Some(entered) = self.entered.take() {
            let _ = entered.await;
        }
    }

    pub fn release(self) {
        let _ = self.release.send(());
    }
}

struct MemoryState {
    tables: Tables,
    triggers: HashMap<String, Vec<Trigger>>,
    unique: HashMap<String, Vec<Vec<String>>>,
    objects: HashMap<String, StoredObject>,
    failures: HashMap<String, VecDeque<String>>,
    holds: HashMap<String, PendingHold>,
    rpcs: HashMap<String, RpcHandler>,
    users: Vec<MemoryUser>,
    session: Option<Session>,
    calls: Vec<CallRecord>,
    clock: DateTime<Utc>,
}

impl MemoryState {
    fn new() -> Self {
        Self {
            tables: HashMap::new(),
            triggers: HashMap::new(),
            unique: HashMap::new(),
            objects: HashMap::new(),
            failures: HashMap::new(),
            holds: HashMap::new(),
            rpcs: HashMap::new(),
            users: Vec::new(),
            session: None,
            calls: Vec::new(),
            clock: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// Strictly increasing timestamps so creation order is total
    fn now(&mut self) -> String {
        let now = Utc::now();
        self.clock = if now > self.clock {
            now
        } else {
            self.clock + ChronoDuration::microseconds(1)
        };
        self.clock.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn stamp(&mut self, row: Value) -> PlatformResult<Value> {
        let Value::Object(mut fields) = row else {
            return Err(PlatformError::InvalidRequest(
                "rows must be JSON objects".to_string(),
            ));
        };
        if !fields.contains_key("id") {
            fields.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        if !fields.contains_key("created_at") {
            let now = self.now();
            fields.insert("created_at".to_string(), Value::String(now));
        }
        Ok(Value::Object(fields))
    }

    /// Run row triggers registered for the event's table
    fn fire(&mut self, event: &ChangeEvent) {
        let triggers = self.triggers.get(&event.table).cloned().unwrap_or_default();
        for trigger in triggers {
            trigger(&mut self.tables, event);
        }
    }

    fn violates_unique(&self, table: &str, row: &Value, pending: &[Value]) -> bool {
        let Some(constraints) = self.unique.get(table) else {
            return false;
        };
        let existing = self.tables.get(table).map(Vec::as_slice).unwrap_or(&[]);
        constraints.iter().any(|columns| {
            existing.iter().chain(pending.iter()).any(|other| {
                columns
                    .iter()
                    .all(|c| row.get(c).is_some() && row.get(c) == other.get(c))
            })
        })
    }
}

/// In-process platform
#[derive(Clone)]
pub struct MemoryPlatform {
    state: Arc<Mutex<MemoryState>>,
    realtime: LocalRealtime,
    auth_events: broadcast::Sender<AuthEvent>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        let (auth_events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(MemoryState::new())),
            realtime: LocalRealtime::new(),
            auth_events,
        }
    }

    // ============= Fixtures =============

    /// Insert rows directly: no call record, no realtime event
    pub fn seed(&self, table: &str, rows: Vec<Value>) -> Vec<Value> {
        let mut state = self.state.lock();
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            if let Ok(row) = state.stamp(row) {
                stored.push(row);
            }
        }
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(stored.iter().cloned());
        stored
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .lock()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Reject inserts that repeat an existing combination of `columns`
    pub fn set_unique(&self, table: &str, columns: &[&str]) {
        self.state
            .lock()
            .unique
            .entry(table.to_string())
            .or_default()
            .push(columns.iter().map(|c| c.to_string()).collect());
    }

    /// Run `trigger` after every write to `table`, like a database row trigger
    /// (maintaining counters, for instance)
    pub fn add_trigger<F>(&self, table: &str, trigger: F)
    where
        F: Fn(&mut Tables, &ChangeEvent) + Send + Sync + 'static,
    {
        self.state
            .lock()
            .triggers
            .entry(table.to_string())
            .or_default()
            .push(Arc::new(trigger));
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.state
            .lock()
            .objects
            .get(&object_key(bucket, path))
            .cloned()
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        let prefix = format!("{}/", bucket);
        self.state
            .lock()
            .objects
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .count()
    }

    pub fn register_rpc<F>(&self, name: &str, handler: F)
    where
        F: Fn(Value) -> PlatformResult<Value> + Send + Sync + 'static,
    {
        self.state
            .lock()
            .rpcs
            .insert(name.to_string(), Arc::new(handler));
    }

    /// Start a session for `user_id` without credentials
    pub fn sign_in_as(&self, user_id: Uuid, email: &str) -> Session {
        let session = new_session(user_id, email);
        self.state.lock().session = Some(session.clone());
        let _ = self.auth_events.send(AuthEvent::SignedIn(session.clone()));
        session
    }

    // ============= Test Controls =============

    /// Fail the next call against `target` with a platform error carrying `message`
    pub fn fail_next(&self, target: &str, message: &str) {
        self.state
            .lock()
            .failures
            .entry(target.to_string())
            .or_default()
            .push_back(message.to_string());
    }

    /// Hold the next call against `target` open until released
    pub fn hold(&self, target: &str) -> HoldHandle {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.state.lock().holds.insert(
            target.to_string(),
            PendingHold {
                entered: entered_tx,
                release: release_rx,
            },
        );
        HoldHandle {
            entered: Some(entered_rx),
            release: release_tx,
        }
    }

    /// Deliver an event to subscribers without touching tables
    pub fn emit(&self, event: ChangeEvent) -> usize {
        self.realtime.publish(&event)
    }

    pub fn realtime_hub(&self) -> &LocalRealtime {
        &self.realtime
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, kind: CallKind, target: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.kind == kind && c.target == target)
            .count()
    }

    // ============= Internals =============

    /// Record the call, wait out a hold, then apply an injected failure
    async fn gate(&self, kind: CallKind, target: &str) -> PlatformResult<()> {
        let hold = {
            let mut state = self.state.lock();
            state.calls.push(CallRecord {
                kind,
                target: target.to_string(),
            });
            state.holds.remove(target)
        };

        if let Some(hold) = hold {
            debug!(target = %target, "Holding call");
            let _ = hold.entered.send(());
            let _ = hold.release.await;
        }

        let failure = {
            let mut state = self.state.lock();
            state
                .failures
                .get_mut(target)
                .and_then(VecDeque::pop_front)
        };
        match failure {
            Some(message) => {
                debug!(target = %target, message = %message, "Injected failure");
                Err(PlatformError::api(500, message))
            }
            None => Ok(()),
        }
    }
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn object_key(bucket: &str, path: &str) -> String {
    format!("{}/{}", bucket, path)
}

fn new_session(user_id: Uuid, email: &str) -> Session {
    Session {
        access_token: format!("memory-{}", Uuid::new_v4()),
        refresh_token: None,
        expires_at: Some(Utc::now() + ChronoDuration::hours(1)),
        user: AuthUser {
            id: user_id,
            email: Some(email.to_string()),
        },
    }
}

fn apply_patch(row: &mut Value, patch: &Map<String, Value>) {
    if let Value::Object(fields) = row {
        for (key, value) in patch {
            fields.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl RowStore for MemoryPlatform {
    async fn select(&self, query: &Query) -> PlatformResult<Vec<Value>> {
        self.gate(CallKind::Select, &query.table).await?;
        let state = self.state.lock();
        let rows = state
            .tables
            .get(&query.table)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        Ok(query.apply(rows))
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> PlatformResult<Vec<Value>> {
        self.gate(CallKind::Insert, table).await?;

        let stored = {
            let mut state = self.state.lock();
            let mut stored = Vec::with_capacity(rows.len());
            for row in rows {
                let row = state.stamp(row)?;
                if state.violates_unique(table, &row, &stored) {
                    return Err(PlatformError::api(
                        409,
                        "duplicate key value violates unique constraint",
                    ));
                }
                stored.push(row);
            }
            state
                .tables
                .entry(table.to_string())
                .or_default()
                .extend(stored.iter().cloned());
            for row in &stored {
                state.fire(&ChangeEvent::insert(table, row.clone()));
            }
            stored
        };

        for row in &stored {
            self.realtime.publish(&ChangeEvent::insert(table, row.clone()));
        }
        Ok(stored)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> PlatformResult<Vec<Value>> {
        self.gate(CallKind::Update, table).await?;
        let Value::Object(patch) = patch else {
            return Err(PlatformError::InvalidRequest(
                "patch must be a JSON object".to_string(),
            ));
        };

        let changed: Vec<(Value, Value)> = {
            let mut state = self.state.lock();
            let rows = state.tables.entry(table.to_string()).or_default();
            let changed: Vec<(Value, Value)> = rows
                .iter_mut()
                .filter(|row| filters.iter().all(|f| f.matches(row)))
                .map(|row| {
                    let old = row.clone();
                    apply_patch(row, &patch);
                    (row.clone(), old)
                })
                .collect();
            for (new, old) in &changed {
                state.fire(&ChangeEvent::update(table, new.clone(), old.clone()));
            }
            changed
        };

        for (new, old) in &changed {
            self.realtime
                .publish(&ChangeEvent::update(table, new.clone(), old.clone()));
        }
        Ok(changed.into_iter().map(|(new, _)| new).collect())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> PlatformResult<Vec<Value>> {
        self.gate(CallKind::Delete, table).await?;

        let deleted: Vec<Value> = {
            let mut state = self.state.lock();
            let rows = state.tables.entry(table.to_string()).or_default();
            let (deleted, kept): (Vec<Value>, Vec<Value>) = rows
                .drain(..)
                .partition(|row| filters.iter().all(|f| f.matches(row)));
            *rows = kept;
            for row in &deleted {
                state.fire(&ChangeEvent::delete(table, row.clone()));
            }
            deleted
        };

        for row in &deleted {
            self.realtime.publish(&ChangeEvent::delete(table, row.clone()));
        }
        Ok(deleted)
    }

    async fn rpc(&self, name: &str, params: Value) -> PlatformResult<Value> {
        self.gate(CallKind::Rpc, &format!("rpc:{}", name)).await?;
        let handler = self.state.lock().rpcs.get(name).cloned();
        match handler {
            Some(handler) => handler(params),
            None => Err(PlatformError::api(
                404,
                format!("Could not find the function {}", name),
            )),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryPlatform {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> PlatformResult<String> {
        self.gate(CallKind::Upload, &format!("storage:{}", bucket))
            .await?;

        let mut state = self.state.lock();
        let key = object_key(bucket, path);
        if state.objects.contains_key(&key) {
            return Err(PlatformError::api(409, "The resource already exists"));
        }
        state.objects.insert(
            key,
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            MEMORY_BASE_URL, bucket, path
        )
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> PlatformResult<()> {
        self.gate(CallKind::Remove, &format!("storage:{}", bucket))
            .await?;

        let mut state = self.state.lock();
        for path in paths {
            state.objects.remove(&object_key(bucket, path));
        }
        Ok(())
    }
}

impl Realtime for MemoryPlatform {
    fn subscribe(&self, spec: ChannelSpec) -> PlatformResult<Subscription> {
        self.realtime.subscribe(spec)
    }
}

#[async_trait]
impl AuthApi for MemoryPlatform {
    fn session(&self) -> Option<Session> {
        self.state.lock().session.clone()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PlatformResult<Session> {
        let session = {
            let mut state = self.state.lock();
            let user = state
                .users
                .iter()
                .find(|u| u.email.eq_ignore_ascii_case(email) && u.password == password)
                .ok_or_else(|| PlatformError::api(400, "Invalid login credentials"))?;
            let session = new_session(user.id, &user.email);
            state.session = Some(session.clone());
            session
        };
        let _ = self.auth_events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, _metadata: Value) -> PlatformResult<Option<Session>> {
        let session = {
            let mut state = self.state.lock();
            if state.users.iter().any(|u| u.email.eq_ignore_ascii_case(email)) {
                return Err(PlatformError::api(422, "User already registered"));
            }
            let id = Uuid::new_v4();
            state.users.push(MemoryUser {
                id,
                email: email.to_string(),
                password: password.to_string(),
            });
            let session = new_session(id, email);
            state.session = Some(session.clone());
            session
        };
        let _ = self.auth_events.send(AuthEvent::SignedIn(session.clone()));
        Ok(Some(session))
    }

    async fn sign_out(&self) -> PlatformResult<()> {
        let had_session = self.state.lock().session.take().is_some();
        if had_session {
            let _ = self.auth_events.send(AuthEvent::SignedOut);
        }
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, _redirect_to: Option<&str>) -> PlatformResult<()> {
        let _ = self.auth_events.send(AuthEvent::PasswordRecoveryRequested {
            email: email.to_string(),
        });
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> PlatformResult<()> {
        {
            let mut state = self.state.lock();
            let user_id = state
                .session
                .as_ref()
                .map(|s| s.user.id)
                .ok_or(PlatformError::NotAuthenticated)?;
            if let Some(user) = state.users.iter_mut().find(|u| u.id == user_id) {
                user.password = new_password.to_string();
            };
        }
        let _ = self.auth_events.send(AuthEvent::UserUpdated);
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }
}
