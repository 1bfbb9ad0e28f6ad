//! Cache metrics, labelled by the kind of key touched (head page, cursor page,
//! viewer index or scan pattern)

use crate::CacheKey;
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<TimelineCacheCounters> = OnceLock::new();

struct TimelineCacheCounters {
    lookups: IntCounterVec,
    writes: IntCounterVec,
    keys_invalidated: IntCounterVec,
    errors: IntCounterVec,
}

fn counter(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help), labels).expect("valid metric definition")
}

impl TimelineCacheCounters {
    fn new() -> Self {
        Self {
            lookups: counter(
                "timeline_cache_lookups_total",
                "Timeline page lookups by page kind and outcome",
                &["kind", "outcome"],
            ),
            writes: counter(
                "timeline_cache_writes_total",
                "Timeline pages written by page kind",
                &["kind"],
            ),
            keys_invalidated: counter(
                "timeline_cache_keys_invalidated_total",
                "Keys removed by invalidation, by the kind of key or pattern requested",
                &["kind"],
            ),
            errors: counter(
                "timeline_cache_errors_total",
                "Cache backend errors by key kind",
                &["kind", "error_type"],
            ),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.lookups.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.keys_invalidated.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn counters() -> &'static TimelineCacheCounters {
    METRICS.get_or_init(TimelineCacheCounters::new)
}

/// Handle used by the stores to record cache activity
#[derive(Clone, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register the counters with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        counters().register(registry)
    }

    pub fn record_hit(&self, key: &str) {
        self.lookup(key, "hit");
    }

    pub fn record_miss(&self, key: &str) {
        self.lookup(key, "miss");
    }

    pub fn record_write(&self, key: &str) {
        counters()
            .writes
            .with_label_values(&[CacheKey::kind(key).as_str()])
            .inc();
    }

    /// `key` is the first key of the batch, or the pattern for scan deletes
    pub fn record_invalidation(&self, key: &str, count: usize) {
        counters()
            .keys_invalidated
            .with_label_values(&[CacheKey::kind(key).as_str()])
            .inc_by(count as u64);
    }

    pub fn record_error(&self, key: &str, error_type: &str) {
        counters()
            .errors
            .with_label_values(&[CacheKey::kind(key).as_str(), error_type])
            .inc();
    }

    fn lookup(&self, key: &str, outcome: &str) {
        counters()
            .lookups
            .with_label_values(&[CacheKey::kind(key).as_str(), outcome])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_into_fresh_registry() {
        let registry = Registry::new();
        CacheMetrics::register(&registry).unwrap();

        let metrics = CacheMetrics::new();
        metrics.record_hit("v1:timeline:abc:head");
        metrics.record_invalidation("v1:timeline:abc:*", 3);

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"timeline_cache_lookups_total".to_string()));
        assert!(names.contains(&"timeline_cache_keys_invalidated_total".to_string()));
    }

    #[test]
    fn test_lookups_are_split_by_page_kind() {
        let metrics = CacheMetrics::new();
        let cursor = counters().lookups.with_label_values(&["cursor", "miss"]);
        let cursor_before = cursor.get();

        metrics.record_miss("v1:timeline:abc:eyJ2IjoxfQ");
        metrics.record_miss("v1:timeline:abc:eyJ2IjoxfQ");

        assert!(cursor.get() >= cursor_before + 2);
    }
}
