//! Social client context
//!
//! Bundles the platform, the query cache, the realtime bridge and the
//! configuration. Cheap to clone; every loader, mutation and watch hangs off it.

use crate::config::Config;
use crate::error::{ClientError, ClientResult, ValidationError};
use mention_parser::MentionPatternCache;
use platform_client::{Platform, RestClient, RestConfig};
use query_cache::QueryCache;
use realtime_bridge::RealtimeBridge;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct SocialClient {
    platform: Platform,
    cache: QueryCache,
    bridge: RealtimeBridge,
    mentions: Arc<MentionPatternCache>,
    config: Arc<Config>,
}

impl SocialClient {
    pub fn new(platform: Platform, cache: QueryCache, config: Config) -> Self {
        let bridge = RealtimeBridge::new(platform.realtime.clone(), cache.clone());
        let mentions = Arc::new(MentionPatternCache::new(
            config.comments.mention_cache_capacity,
        ));
        Self {
            platform,
            cache,
            bridge,
            mentions,
            config: Arc::new(config),
        }
    }

    /// Client over HTTP with a fresh cache
    pub fn connect(config: Config) -> ClientResult<Self> {
        let rest = RestClient::new(RestConfig {
            base_url: config.platform.url.clone(),
            anon_key: config.platform.anon_key.clone(),
            timeout: config.platform.request_timeout,
        })?;

        info!(url = %config.platform.url, "Social client connected");
        Ok(Self::new(
            Platform::from_backend(rest),
            QueryCache::new(),
            config,
        ))
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn bridge(&self) -> &RealtimeBridge {
        &self.bridge
    }

    pub fn mentions(&self) -> &MentionPatternCache {
        &self.mentions
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Signed-in user, or `NotSignedIn`
    pub fn viewer_id(&self) -> ClientResult<Uuid> {
        self.platform
            .current_user_id()
            .ok_or(ClientError::Validation(ValidationError::NotSignedIn))
    }

    /// Run one platform call under the configured request timeout
    pub(crate) async fn call<F, T, E>(&self, future: F) -> ClientResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ClientError>,
    {
        with_timeout(self.config.platform.request_timeout, future).await
    }
}

/// Bound a fallible future by `duration`
pub async fn with_timeout<F, T, E>(duration: Duration, future: F) -> ClientResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<ClientError>,
{
    match timeout(duration, future).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            warn!(timeout = ?duration, "Platform call timed out");
            Err(ClientError::Timeout(duration))
        }
    }
}
