//! Platform client
//!
//! Typed access to the hosted backend platform the social client is built on:
//! - Row operations and remote procedures ([`RowStore`])
//! - Object storage ([`ObjectStore`])
//! - Realtime change feeds ([`Realtime`])
//! - Authentication ([`AuthApi`])
//!
//! Two implementations: [`RestClient`] over HTTP and [`MemoryPlatform`]
//! in-process. [`Platform`] bundles one of them behind trait objects.

mod error;
mod memory;
mod realtime;
mod rest;
mod traits;

pub mod query;

pub use error::{PlatformError, PlatformResult};
pub use memory::{CallKind, CallRecord, HoldHandle, MemoryPlatform, StoredObject, Tables};
pub use query::{Filter, Order, Query};
pub use realtime::{LocalRealtime, SubscriberId};
pub use rest::{RestClient, RestConfig};
pub use traits::{
    AuthApi, AuthEvent, AuthUser, ChangeEvent, ChangeKind, ChannelSpec, ObjectStore, Platform,
    Realtime, RowStore, Session, Subscription,
};
