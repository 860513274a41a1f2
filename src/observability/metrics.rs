use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;
use crate::error::{ServiceError, ServiceResult};
use crate::types::FoodSource;

/// Prometheus metrics registry and collectors
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

/// All application metrics
pub struct Metrics {
    // Search metrics
    pub food_search_total: Counter,
    pub food_search_duration_seconds: Histogram,
    pub food_search_primary_source_total: CounterVec,

    // Point lookup metrics
    pub food_lookup_hits_total: CounterVec,
    pub food_lookup_misses_total: Counter,

    // Tier maintenance metrics
    pub cache_writeback_failures_total: CounterVec,
    pub external_errors_total: Counter,
    pub prefetch_items_total: Counter,
    pub local_evictions_total: Counter,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all collectors
    pub fn new() -> ServiceResult<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(Metrics::new(&registry)?);

        Ok(Self { registry, metrics })
    }

    /// Get metrics in Prometheus text format
    pub fn gather(&self) -> ServiceResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| ServiceError::Internal(format!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer)
            .map_err(|e| ServiceError::Internal(format!("Failed to convert metrics to string: {}", e)))
    }

    /// Get the underlying registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> ServiceResult<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| ServiceError::Internal(format!("Failed to create {} metric: {}", name, e)))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| ServiceError::Internal(format!("Failed to register {}: {}", name, e)))?;
    Ok(counter)
}

fn counter_vec(registry: &Registry, name: &str, help: &str, label: &str) -> ServiceResult<CounterVec> {
    let counter = CounterVec::new(Opts::new(name, help), &[label])
        .map_err(|e| ServiceError::Internal(format!("Failed to create {} metric: {}", name, e)))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| ServiceError::Internal(format!("Failed to register {}: {}", name, e)))?;
    Ok(counter)
}

impl Metrics {
    fn new(registry: &Registry) -> ServiceResult<Self> {
        let food_search_total = counter(registry, "food_search_total", "Total number of food searches processed")?;

        let food_search_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "food_search_duration_seconds",
            "Duration of combined food searches in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]))
        .map_err(|e| ServiceError::Internal(format!("Failed to create food_search_duration_seconds metric: {}", e)))?;
        registry.register(Box::new(food_search_duration_seconds.clone()))
            .map_err(|e| ServiceError::Internal(format!("Failed to register food_search_duration_seconds: {}", e)))?;

        let food_search_primary_source_total = counter_vec(
            registry,
            "food_search_primary_source_total",
            "Searches by the tier that contributed the most results",
            "source",
        )?;

        let food_lookup_hits_total = counter_vec(
            registry,
            "food_lookup_hits_total",
            "Point lookups served, by tier",
            "tier",
        )?;
        let food_lookup_misses_total = counter(
            registry,
            "food_lookup_misses_total",
            "Point lookups absent from every tier",
        )?;

        let cache_writeback_failures_total = counter_vec(
            registry,
            "cache_writeback_failures_total",
            "Failed background write-backs, by target tier",
            "tier",
        )?;
        let external_errors_total = counter(
            registry,
            "external_errors_total",
            "Errors returned by the third-party product database",
        )?;
        let prefetch_items_total = counter(
            registry,
            "prefetch_items_total",
            "Popular items copied into the local tier at startup",
        )?;
        let local_evictions_total = counter(
            registry,
            "local_evictions_total",
            "Food items evicted from the local tier",
        )?;

        Ok(Self {
            food_search_total,
            food_search_duration_seconds,
            food_search_primary_source_total,
            food_lookup_hits_total,
            food_lookup_misses_total,
            cache_writeback_failures_total,
            external_errors_total,
            prefetch_items_total,
            local_evictions_total,
        })
    }

    pub fn record_lookup_hit(&self, tier: FoodSource) {
        self.food_lookup_hits_total.with_label_values(&[tier.as_str()]).inc();
    }

    pub fn record_writeback_failure(&self, tier: FoodSource) {
        self.cache_writeback_failures_total.with_label_values(&[tier.as_str()]).inc();
    }

    pub fn record_primary_source(&self, source: FoodSource) {
        self.food_search_primary_source_total.with_label_values(&[source.as_str()]).inc();
    }
}

/// Timer helper for measuring durations
pub struct Timer {
    start: Instant,
    histogram: Histogram,
}

impl Timer {
    pub fn new(histogram: Histogram) -> Self {
        Self {
            start: Instant::now(),
            histogram,
        }
    }

    pub fn observe(self) {
        let duration = self.start.elapsed();
        self.histogram.observe(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registry_creation() {
        let registry = MetricsRegistry::new().unwrap();
        assert!(registry.gather().is_ok());
    }

    #[test]
    fn test_metrics_collection() {
        let registry = MetricsRegistry::new().unwrap();

        registry.metrics.food_search_total.inc();
        registry.metrics.record_lookup_hit(FoodSource::Local);
        registry.metrics.record_writeback_failure(FoodSource::Cloud);
        registry.metrics.record_primary_source(FoodSource::External);
        registry.metrics.local_evictions_total.inc();

        let output = registry.gather().unwrap();
        assert!(output.contains("food_search_total"));
        assert!(output.contains("food_lookup_hits_total{tier=\"local\"}"));
        assert!(output.contains("cache_writeback_failures_total{tier=\"cloud\"}"));
        assert!(output.contains("food_search_primary_source_total{source=\"external\"}"));
        assert!(output.contains("local_evictions_total"));
    }

    #[test]
    fn test_timer_functionality() {
        let registry = MetricsRegistry::new().unwrap();
        let timer = Timer::new(registry.metrics.food_search_duration_seconds.clone());

        std::thread::sleep(std::time::Duration::from_millis(1));
        timer.observe();

        let output = registry.gather().unwrap();
        assert!(output.contains("food_search_duration_seconds_count 1"));
    }

    #[test]
    fn test_registries_are_isolated() {
        let first = MetricsRegistry::new().unwrap();
        let second = MetricsRegistry::new().unwrap();
        first.metrics.food_search_total.inc();

        assert!(second.gather().unwrap().contains("food_search_total 0"));
    }
}
