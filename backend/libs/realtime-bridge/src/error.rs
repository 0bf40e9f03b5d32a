//! Error types for realtime sync

use thiserror::Error;

/// Realtime bridge errors
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Subscribing to the platform failed
    #[error("Platform error: {0}")]
    Platform(#[from] platform_client::PlatformError),

    /// Reading or writing cached pages failed
    #[error("Cache error: {0}")]
    Cache(#[from] query_cache::CacheError),

    /// Refetch callback failed
    #[error("Refetch failed: {0}")]
    Refetch(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::Refetch("timed out".to_string());
        assert_eq!(err.to_string(), "Refetch failed: timed out");
    }

    #[test]
    fn test_error_from_cache() {
        let err: BridgeError = query_cache::CacheError::NotFound("v1:chat:1".to_string()).into();
        assert!(matches!(err, BridgeError::Cache(_)));
    }
}
