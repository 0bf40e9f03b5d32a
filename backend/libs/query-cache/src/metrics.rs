//! Cache metrics for observability

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    writes: CounterVec,
    invalidations: CounterVec,
    cancellations: CounterVec,
    discarded_fetches: CounterVec,
    rollbacks: CounterVec,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: CounterVec::new(
                Opts::new("social_query_cache_hits_total", "Total query cache hits"),
                &["entity"],
            )
            .expect("valid metric definition"),
            misses: CounterVec::new(
                Opts::new("social_query_cache_misses_total", "Total query cache misses"),
                &["entity"],
            )
            .expect("valid metric definition"),
            writes: CounterVec::new(
                Opts::new("social_query_cache_writes_total", "Total query cache writes"),
                &["entity", "source"],
            )
            .expect("valid metric definition"),
            invalidations: CounterVec::new(
                Opts::new(
                    "social_query_cache_invalidations_total",
                    "Total query cache invalidations",
                ),
                &["entity"],
            )
            .expect("valid metric definition"),
            cancellations: CounterVec::new(
                Opts::new(
                    "social_query_cache_cancellations_total",
                    "Total in-flight fetch cancellations",
                ),
                &["entity"],
            )
            .expect("valid metric definition"),
            discarded_fetches: CounterVec::new(
                Opts::new(
                    "social_query_cache_discarded_fetches_total",
                    "Fetch results dropped because their key was cancelled",
                ),
                &["entity"],
            )
            .expect("valid metric definition"),
            rollbacks: CounterVec::new(
                Opts::new(
                    "social_query_cache_rollbacks_total",
                    "Optimistic writes restored from snapshot",
                ),
                &["entity"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.invalidations.clone()))?;
        registry.register(Box::new(self.cancellations.clone()))?;
        registry.register(Box::new(self.discarded_fetches.clone()))?;
        registry.register(Box::new(self.rollbacks.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Extract entity type from cache key for metrics labeling
fn extract_entity(key: &str) -> &str {
    crate::CacheKey::entity_type(key).unwrap_or("unknown")
}

/// Where a cache write came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSource {
    Fetch,
    Optimistic,
    Realtime,
}

impl WriteSource {
    fn as_str(&self) -> &'static str {
        match self {
            WriteSource::Fetch => "fetch",
            WriteSource::Optimistic => "optimistic",
            WriteSource::Realtime => "realtime",
        }
    }
}

/// Cache metrics wrapper
#[derive(Clone, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self, key: &str) {
        let entity = extract_entity(key);
        get_metrics().hits.with_label_values(&[entity]).inc();
    }

    pub fn record_miss(&self, key: &str) {
        let entity = extract_entity(key);
        get_metrics().misses.with_label_values(&[entity]).inc();
    }

    pub fn record_write(&self, key: &str, source: WriteSource) {
        let entity = extract_entity(key);
        get_metrics()
            .writes
            .with_label_values(&[entity, source.as_str()])
            .inc();
    }

    pub fn record_invalidation(&self, key: &str) {
        let entity = extract_entity(key);
        get_metrics()
            .invalidations
            .with_label_values(&[entity])
            .inc();
    }

    pub fn record_cancellation(&self, key: &str) {
        let entity = extract_entity(key);
        get_metrics()
            .cancellations
            .with_label_values(&[entity])
            .inc();
    }

    pub fn record_discarded_fetch(&self, key: &str) {
        let entity = extract_entity(key);
        get_metrics()
            .discarded_fetches
            .with_label_values(&[entity])
            .inc();
    }

    pub fn record_rollback(&self, key: &str) {
        let entity = extract_entity(key);
        get_metrics().rollbacks.with_label_values(&[entity]).inc();
    }
}
