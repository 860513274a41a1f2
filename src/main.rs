use fitfuel_api::observability::{init_logging, sanitize_url_for_logging, MetricsRegistry};
use fitfuel_api::{
    AppState, Config, DailyNutritionCache, EventBus, FitfuelServer, FoodService, LocalFoodCache,
    LocalProfileCache, LocalStore, OpenFoodFactsClient, PostgresClient, PostgresPlanCatalog,
    PostgresProfileStore, RecommendationService, RemoteFoodCache, ServiceResult, SyncService,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ServiceResult<()> {
    let config = Config::from_env()?;
    init_logging(&config.logging)?;

    info!("Starting fitfuel API server");
    info!(
        "Remote store: {}",
        sanitize_url_for_logging(&config.database.url)
    );

    let metrics = MetricsRegistry::new()?;

    // Local tier
    let local_store = Arc::new(LocalStore::new(&config.local_cache.path));
    local_store.initialize()?;
    let local_foods = Arc::new(
        LocalFoodCache::new(local_store.clone(), config.local_cache.food_capacity)
            .with_metrics(metrics.metrics.clone()),
    );
    let local_profiles = Arc::new(LocalProfileCache::new(local_store.clone()));
    let nutrition = Arc::new(DailyNutritionCache::new(
        local_store.clone(),
        config.local_cache.nutrition_window_days,
    ));

    // Remote tier
    let database = PostgresClient::new(&config.database).await?;
    database.initialize_schema().await?;
    let remote_foods = Arc::new(RemoteFoodCache::new(&database));
    let remote_profiles = Arc::new(PostgresProfileStore::new(&database));
    let catalog = Arc::new(PostgresPlanCatalog::new(&database));

    // External tier
    let external = Arc::new(OpenFoodFactsClient::new(&config.external)?);

    let food = Arc::new(
        FoodService::new(local_foods, remote_foods, external, config.search.clone())
            .with_metrics(metrics.metrics.clone()),
    );
    food.spawn_prefetch();

    let sync = Arc::new(SyncService::new(remote_profiles, local_profiles, Arc::new(EventBus::new())));
    sync.initialize();

    let state = AppState {
        food: food.clone(),
        sync: sync.clone(),
        recommendations: Arc::new(RecommendationService::new(catalog)),
        nutrition,
        nutrition_window_days: config.local_cache.nutrition_window_days,
        metrics,
        database: Some(database),
        request_timeout: Duration::from_millis(config.server.request_timeout_ms),
    };

    let server = FitfuelServer::new(state, config.server.clone());
    let result = server.run(shutdown_signal()).await;

    info!("Shutting down");
    food.shutdown().await;
    sync.teardown();
    local_store.close();

    if let Err(e) = &result {
        error!("Server stopped with error: {}", e);
    }
    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
