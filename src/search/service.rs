/// Food service that composes the local, cloud and external tiers
///
/// Point lookups walk the tiers in order and populate faster tiers on a deeper hit.
/// Searches query every tier concurrently, rank each tier's results on their own and
/// concatenate them local-first. All write-backs run as detached background tasks.

use crate::cache::LocalFoodStore;
use crate::config::{SearchConfig, MIN_QUERY_LENGTH};
use crate::database::SharedFoodStore;
use crate::error::{ServiceError, ServiceResult, ValidationError};
use crate::external::ExternalFoodSource;
use crate::observability::{sanitize_query, Metrics, Timer};
use crate::search::ranking::rank;
use crate::types::{FoodItem, FoodSearchResponse, FoodSource, MatchType, RankedFood};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

/// Tiered food lookup and search
pub struct FoodService {
    local: Arc<dyn LocalFoodStore>,
    cloud: Arc<dyn SharedFoodStore>,
    external: Arc<dyn ExternalFoodSource>,
    config: SearchConfig,
    metrics: Option<Arc<Metrics>>,
    /// Detached write-back and prefetch tasks
    background: TaskTracker,
}

/// One tier's search outcome with how long it took
struct TierOutcome {
    source: FoodSource,
    result: ServiceResult<Vec<FoodItem>>,
    elapsed: Duration,
}

async fn timed<F>(source: FoodSource, fut: F) -> TierOutcome
where
    F: Future<Output = ServiceResult<Vec<FoodItem>>>,
{
    let start = Instant::now();
    let result = fut.await;
    TierOutcome {
        source,
        result,
        elapsed: start.elapsed(),
    }
}

/// EAN-8 up to GTIN-14
const BARCODE_LENGTH: std::ops::RangeInclusive<usize> = 8..=14;

/// Trimmed barcode, or a validation error for anything that is not 8-14 ASCII digits
fn validate_barcode(key: &str) -> ServiceResult<&str> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ValidationError::MissingField("barcode").into());
    }
    if !BARCODE_LENGTH.contains(&key.len()) || !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidField {
            field: "barcode",
            reason: format!(
                "expected {}-{} digits",
                BARCODE_LENGTH.start(),
                BARCODE_LENGTH.end()
            ),
        }
        .into());
    }
    Ok(key)
}

impl FoodService {
    pub fn new(
        local: Arc<dyn LocalFoodStore>,
        cloud: Arc<dyn SharedFoodStore>,
        external: Arc<dyn ExternalFoodSource>,
        config: SearchConfig,
    ) -> Self {
        Self {
            local,
            cloud,
            external,
            config,
            metrics: None,
            background: TaskTracker::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Resolve a barcode through local, cloud, then external.
    ///
    /// A miss falls through to the next tier; any other error is returned with the
    /// tier and key attached. Returns `NotFound` when every tier misses.
    #[instrument(skip(self))]
    pub async fn get_by_key(&self, key: &str) -> ServiceResult<FoodItem> {
        let key = validate_barcode(key)?;

        if let Some(item) = self
            .local
            .get_by_key(key)
            .await
            .map_err(|e| e.in_tier(FoodSource::Local, "get_by_key", key))?
        {
            debug!("Local hit for {}", key);
            self.record_hit(FoodSource::Local);
            return Ok(item);
        }

        if let Some(item) = self
            .cloud
            .get_by_key(key)
            .await
            .map_err(|e| e.in_tier(FoodSource::Cloud, "get_by_key", key))?
        {
            debug!("Cloud hit for {}", key);
            self.record_hit(FoodSource::Cloud);
            self.spawn_writeback(FoodSource::Local, vec![item.clone()]);
            return Ok(item);
        }

        if let Some(item) = self
            .external
            .get_by_key(key)
            .await
            .map_err(|e| {
                self.record_external_error();
                e.in_tier(FoodSource::External, "get_by_key", key)
            })?
        {
            debug!("External hit for {}", key);
            self.record_hit(FoodSource::External);
            // Cache under the code that was asked for, not the upstream canonical code
            let item = FoodItem {
                key: key.to_string(),
                ..item
            };
            self.spawn_writeback(FoodSource::Cloud, vec![item.clone()]);
            self.spawn_writeback(FoodSource::Local, vec![item.clone()]);
            return Ok(item);
        }

        if let Some(metrics) = &self.metrics {
            metrics.food_lookup_misses_total.inc();
        }
        debug!("{} not found in any tier", key);
        Err(ServiceError::NotFound { key: key.to_string() })
    }

    /// Search every tier and return local results, then cloud, then external.
    ///
    /// Queries shorter than two characters return an empty response without touching
    /// any tier. A failing tier is logged and contributes nothing; the search only
    /// fails when every tier fails.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn search(&self, query: &str) -> ServiceResult<FoodSearchResponse> {
        let start = Instant::now();
        let trimmed = query.trim();
        if trimmed.chars().count() < MIN_QUERY_LENGTH {
            return Ok(FoodSearchResponse::empty(trimmed));
        }

        let timer = self
            .metrics
            .as_ref()
            .map(|m| Timer::new(m.food_search_duration_seconds.clone()));
        let limit = self.config.tier_limit;
        let external_timeout = Duration::from_millis(self.config.external_timeout_ms);

        let (local, cloud, external) = tokio::join!(
            timed(FoodSource::Local, self.local.search_by_name(trimmed, limit)),
            timed(FoodSource::Cloud, self.cloud.search_by_name(trimmed, limit)),
            timed(FoodSource::External, async {
                match timeout(external_timeout, self.external.search(trimmed, limit)).await {
                    Ok(result) => result,
                    Err(_) => Err(ServiceError::Timeout),
                }
            }),
        );

        let elapsed = [local.elapsed, cloud.elapsed, external.elapsed];
        let mut first_error = None;
        let mut failures = 0;
        let mut tier_items = Vec::with_capacity(3);
        for outcome in [local, cloud, external] {
            match outcome.result {
                Ok(items) => tier_items.push(items),
                Err(e) => {
                    warn!(
                        "{} search failed for '{}', continuing without it: {}",
                        outcome.source,
                        sanitize_query(trimmed),
                        e
                    );
                    if outcome.source == FoodSource::External {
                        self.record_external_error();
                    }
                    failures += 1;
                    first_error.get_or_insert(e.in_tier(outcome.source, "search", trimmed));
                    tier_items.push(Vec::new());
                }
            }
        }
        if failures == 3 {
            if let Some(err) = first_error {
                return Err(err);
            }
        }

        let mut tier_items = tier_items.into_iter();
        let local_items = tier_items.next().unwrap_or_default();
        let cloud_items = tier_items.next().unwrap_or_default();
        let external_items = tier_items.next().unwrap_or_default();

        let mut seen: HashSet<String> = local_items.iter().map(|item| item.key.clone()).collect();
        let cloud_items: Vec<FoodItem> = cloud_items
            .into_iter()
            .filter(|item| !seen.contains(&item.key))
            .collect();
        seen.extend(cloud_items.iter().map(|item| item.key.clone()));
        let external_items: Vec<FoodItem> = external_items
            .into_iter()
            .filter(|item| !seen.contains(&item.key))
            .collect();

        let ranked_local = rank(local_items, trimmed, FoodSource::Local);
        let ranked_cloud = rank(cloud_items, trimmed, FoodSource::Cloud);
        let ranked_external = rank(external_items, trimmed, FoodSource::External);

        self.write_back_search_results(&ranked_cloud, &ranked_external);

        let mut items = ranked_local;
        items.extend(ranked_cloud);
        items.extend(ranked_external);
        items.truncate(self.config.max_results);

        let count = |source: FoodSource| items.iter().filter(|r| r.source == source).count();
        let local_count = count(FoodSource::Local);
        let cloud_count = count(FoodSource::Cloud);
        let external_count = count(FoodSource::External);
        let primary_source = primary_source([
            (FoodSource::Local, local_count, elapsed[0]),
            (FoodSource::Cloud, cloud_count, elapsed[1]),
            (FoodSource::External, external_count, elapsed[2]),
        ]);

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        if let Some(metrics) = &self.metrics {
            metrics.food_search_total.inc();
            if let Some(source) = primary_source {
                metrics.record_primary_source(source);
            }
        }
        if let Some(timer) = timer {
            timer.observe();
        }

        info!(
            "Search '{}' returned {} results ({} local, {} cloud, {} external) in {:.1}ms",
            sanitize_query(trimmed),
            items.len(),
            local_count,
            cloud_count,
            external_count,
            elapsed_ms
        );

        Ok(FoodSearchResponse {
            query: trimmed.to_string(),
            items,
            elapsed_ms,
            primary_source,
            local_count,
            cloud_count,
            external_count,
        })
    }

    /// Copy the globally most used items into the local tier, one at a time.
    /// Never fails; returns how many items were cached.
    pub async fn prefetch_popular(&self) -> usize {
        let items = match self.cloud.get_most_used(self.config.prefetch_limit).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Prefetch skipped, could not load popular items: {}", e);
                return 0;
            }
        };

        let total = items.len();
        let mut cached = 0;
        for item in items {
            match self.local.put(&item).await {
                Ok(()) => cached += 1,
                Err(e) => warn!("Prefetch failed to cache {}: {}", item.key, e),
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.prefetch_items_total.inc_by(cached as f64);
        }
        info!("Prefetched {} of {} popular items into the local tier", cached, total);
        cached
    }

    /// Run `prefetch_popular` detached from the caller
    pub fn spawn_prefetch(self: &Arc<Self>) {
        let service = Arc::clone(self);
        self.background.spawn(async move {
            service.prefetch_popular().await;
        });
    }

    /// Wait for every write-back started so far
    pub async fn flush_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    /// Stop accepting background work and drain what is in flight
    pub async fn shutdown(&self) {
        info!("Draining {} background tasks", self.background.len());
        self.background.close();
        self.background.wait().await;
    }

    /// Cache cloud results locally and external results in both faster tiers.
    /// External records only qualify when the query matched their name.
    fn write_back_search_results(&self, cloud: &[RankedFood], external: &[RankedFood]) {
        let limit = self.config.writeback_limit;

        let from_cloud: Vec<FoodItem> = cloud.iter().take(limit).map(|r| r.item.clone()).collect();
        let from_external: Vec<FoodItem> = external
            .iter()
            .filter(|r| r.match_type != MatchType::BrandMatch)
            .take(limit)
            .map(|r| r.item.clone())
            .collect();

        let mut to_local = from_cloud;
        to_local.extend(from_external.iter().cloned());

        if !from_external.is_empty() {
            self.spawn_writeback(FoodSource::Cloud, from_external);
        }
        if !to_local.is_empty() {
            self.spawn_writeback(FoodSource::Local, to_local);
        }
    }

    /// Fire-and-forget: failures are logged and counted, never returned
    fn spawn_writeback(&self, tier: FoodSource, items: Vec<FoodItem>) {
        let local = self.local.clone();
        let cloud = self.cloud.clone();
        let metrics = self.metrics.clone();

        self.background.spawn(async move {
            for item in items {
                let result = match tier {
                    FoodSource::Local => local.put(&item).await,
                    FoodSource::Cloud => cloud.put(&item).await,
                    FoodSource::External => Ok(()),
                };
                if let Err(e) = result {
                    warn!("Write-back of {} to {} tier failed: {}", item.key, tier, e);
                    if let Some(metrics) = &metrics {
                        metrics.record_writeback_failure(tier);
                    }
                }
            }
        });
    }

    fn record_hit(&self, tier: FoodSource) {
        if let Some(metrics) = &self.metrics {
            metrics.record_lookup_hit(tier);
        }
    }

    fn record_external_error(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.external_errors_total.inc();
        }
    }
}

/// Tier with the most results; ties go to the tier that answered first
fn primary_source(tiers: [(FoodSource, usize, Duration); 3]) -> Option<FoodSource> {
    tiers
        .iter()
        .filter(|(_, count, _)| *count > 0)
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.2.cmp(&a.2)))
        .map(|(source, _, _)| *source)
}
