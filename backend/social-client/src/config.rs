//! Configuration for the social client
//!
//! Loaded from environment variables (and a `.env` file when present), with
//! defaults for everything except the platform URL and key.

use crate::error::{ClientError, ClientResult};
use std::str::FromStr;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Hosted platform connection
    pub platform: PlatformConfig,
    /// Storage buckets and upload limits
    pub storage: StorageConfig,
    /// Page sizes per loader
    pub pages: PageConfig,
    /// Comment limits and mention matching
    pub comments: CommentConfig,
    /// Log filter and format
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub url: String,
    pub anon_key: String,
    /// Upper bound for every platform call
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Bucket for comment images
    pub comment_media_bucket: String,
    /// Bucket for post media
    pub post_media_bucket: String,
    pub max_upload_bytes: usize,
    pub allowed_media_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PageConfig {
    pub feed: usize,
    pub comments: usize,
    pub chat: usize,
    pub notifications: usize,
}

#[derive(Debug, Clone)]
pub struct CommentConfig {
    /// Maximum length in characters
    pub max_length: usize,
    /// Maximum nesting depth shown before replies flatten
    pub max_visible_depth: usize,
    pub mention_cache_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter; `RUST_LOG` overrides it
    pub filter: String,
    pub json: bool,
}

const DEFAULT_MEDIA_TYPES: &str = "image/jpeg,image/png,image/gif,image/webp";

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: PlatformConfig {
                url: "http://localhost:54321".to_string(),
                anon_key: String::new(),
                request_timeout: Duration::from_millis(15_000),
            },
            storage: StorageConfig {
                comment_media_bucket: "media".to_string(),
                post_media_bucket: "post_media".to_string(),
                max_upload_bytes: 10 * 1024 * 1024,
                allowed_media_types: parse_list(DEFAULT_MEDIA_TYPES),
            },
            pages: PageConfig {
                feed: 10,
                comments: 20,
                chat: 30,
                notifications: 20,
            },
            comments: CommentConfig {
                max_length: 2000,
                max_visible_depth: 3,
                mention_cache_capacity: mention_parser::DEFAULT_PATTERN_CACHE_CAPACITY,
            },
            logging: LoggingConfig {
                filter: "info,social_client=debug".to_string(),
                json: false,
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> ClientResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let url = lookup("SOCIAL_PLATFORM_URL")
            .ok_or_else(|| ClientError::Config("SOCIAL_PLATFORM_URL must be set".to_string()))?;
        let anon_key = lookup("SOCIAL_PLATFORM_ANON_KEY").ok_or_else(|| {
            ClientError::Config("SOCIAL_PLATFORM_ANON_KEY must be set".to_string())
        })?;

        Ok(Config {
            platform: PlatformConfig {
                url,
                anon_key,
                request_timeout: Duration::from_millis(parse_var(
                    &lookup,
                    "SOCIAL_REQUEST_TIMEOUT_MS",
                    defaults.platform.request_timeout.as_millis() as u64,
                )?),
            },
            storage: StorageConfig {
                comment_media_bucket: lookup("SOCIAL_MEDIA_BUCKET")
                    .unwrap_or(defaults.storage.comment_media_bucket),
                post_media_bucket: lookup("SOCIAL_POST_MEDIA_BUCKET")
                    .unwrap_or(defaults.storage.post_media_bucket),
                max_upload_bytes: parse_var(
                    &lookup,
                    "SOCIAL_MAX_UPLOAD_BYTES",
                    defaults.storage.max_upload_bytes,
                )?,
                allowed_media_types: lookup("SOCIAL_ALLOWED_MEDIA_TYPES")
                    .map(|v| parse_list(&v))
                    .unwrap_or(defaults.storage.allowed_media_types),
            },
            pages: PageConfig {
                feed: parse_page_size(&lookup, "SOCIAL_FEED_PAGE_SIZE", defaults.pages.feed)?,
                comments: parse_page_size(
                    &lookup,
                    "SOCIAL_COMMENTS_PAGE_SIZE",
                    defaults.pages.comments,
                )?,
                chat: parse_page_size(&lookup, "SOCIAL_CHAT_PAGE_SIZE", defaults.pages.chat)?,
                notifications: parse_page_size(
                    &lookup,
                    "SOCIAL_NOTIFICATIONS_PAGE_SIZE",
                    defaults.pages.notifications,
                )?,
            },
            comments: CommentConfig {
                max_length: parse_var(
                    &lookup,
                    "SOCIAL_MAX_COMMENT_LENGTH",
                    defaults.comments.max_length,
                )?,
                max_visible_depth: parse_var(
                    &lookup,
                    "SOCIAL_MAX_VISIBLE_DEPTH",
                    defaults.comments.max_visible_depth,
                )?,
                mention_cache_capacity: parse_var(
                    &lookup,
                    "SOCIAL_MENTION_CACHE_CAPACITY",
                    defaults.comments.mention_cache_capacity,
                )?,
            },
            logging: LoggingConfig {
                filter: lookup("SOCIAL_LOG_FILTER").unwrap_or(defaults.logging.filter),
                json: parse_var(&lookup, "SOCIAL_LOG_JSON", defaults.logging.json)?,
            },
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> ClientResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ClientError::Config(format!("{} has an invalid value: {:?}", name, raw))),
        None => Ok(default),
    }
}

fn parse_page_size<F>(lookup: &F, name: &str, default: usize) -> ClientResult<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let size = parse_var(lookup, name, default)?;
    if size == 0 {
        return Err(ClientError::Config(format!("{} must be at least 1", name)));
    }
    Ok(size)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
