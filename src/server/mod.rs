use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::LocalNutritionStore;
use crate::config::ServerConfig;
use crate::database::PostgresClient;
use crate::error::{ServiceError, ValidationError};
use crate::observability::MetricsRegistry;
use crate::recommendation::{PlanRecommendation, RecommendationService};
use crate::search::FoodService;
use crate::sync::SyncService;
use crate::types::{DailyNutritionSummary, FoodItem, FoodSearchResponse, ProfileUpdate, StoredProfile, UserProfile};

const DEFAULT_RECOMMENDATION_LIMIT: usize = 5;
const MAX_RECOMMENDATION_LIMIT: usize = 20;
const DEFAULT_NUTRITION_DAYS: usize = 7;

/// HTTP server over the food, profile and recommendation services
pub struct FitfuelServer {
    app: Router,
    config: ServerConfig,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub food: Arc<FoodService>,
    pub sync: Arc<SyncService>,
    pub recommendations: Arc<RecommendationService>,
    pub nutrition: Arc<dyn LocalNutritionStore>,
    /// Upper bound for `/nutrition?days=`, the size of the local window
    pub nutrition_window_days: usize,
    pub metrics: MetricsRegistry,
    /// Remote store probed by `/health`; `None` skips the probe
    pub database: Option<PostgresClient>,
    pub request_timeout: Duration,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<T, ApiError>;

impl FitfuelServer {
    pub fn new(state: AppState, config: ServerConfig) -> Self {
        let app = router(state, &config);
        Self { app, config }
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> crate::error::ServiceResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ServiceError::ConfigError(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        info!("HTTP server listening on {}", bind_addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServiceError::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }
}

/// Build the application router
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/foods/search", get(search_foods_handler))
        .route("/foods/:barcode", get(get_food_handler))
        .route(
            "/profiles/:id",
            get(get_profile_handler)
                .patch(update_profile_handler)
                .delete(delete_profile_handler),
        )
        .route("/profiles/:id/image", put(update_profile_image_handler))
        .route("/recommendations", post(recommendations_handler))
        .route("/nutrition", get(recent_nutrition_handler))
        .route("/nutrition/:date", get(get_nutrition_handler).put(put_nutrition_handler))
        .layer(RequestBodyLimitLayer::new(config.max_request_size))
        .layer(middleware::from_fn_with_state(state.clone(), timeout_middleware))
        .layer(middleware::from_fn(security_middleware))
        .layer(cors)
        .with_state(state)
}

/// Bound every request by the configured timeout
async fn timeout_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    match timeout(state.request_timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            error!("Request to {} timed out", path);
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(ErrorResponse {
                    error: "timeout".to_string(),
                    message: "Request processing took too long".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Middleware for security headers
async fn security_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("strict-origin-when-cross-origin"));

    response
}

/// Map a service error to its HTTP status and JSON body
fn api_error(err: ServiceError) -> ApiError {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else if err.is_not_found() {
        debug!("{}", err);
    } else {
        warn!("Request rejected: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.error_type().to_string(),
            message: err.to_string(),
        }),
    )
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn search_foods_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<FoodSearchResponse>> {
    state.food.search(&params.q).await.map(Json).map_err(api_error)
}

async fn get_food_handler(State(state): State<AppState>, Path(barcode): Path<String>) -> ApiResult<Json<FoodItem>> {
    state.food.get_by_key(&barcode).await.map(Json).map_err(api_error)
}

async fn get_profile_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<StoredProfile>> {
    state.sync.get_profile(id).await.map(Json).map_err(api_error)
}

async fn update_profile_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<StoredProfile>> {
    state.sync.update_profile(id, update).await.map(Json).map_err(api_error)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageUpdateRequest {
    pub image_url: String,
}

async fn update_profile_image_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ImageUpdateRequest>,
) -> ApiResult<StatusCode> {
    state
        .sync
        .update_profile_image(id, &request.image_url)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_profile_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.sync.delete_profile(id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Either an inline training profile or the id of a stored one
#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub profile_id: Option<Uuid>,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    #[serde(default)]
    pub limit: Option<usize>,
}

async fn recommendations_handler(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> ApiResult<Json<Vec<PlanRecommendation>>> {
    let limit = request.limit.unwrap_or(DEFAULT_RECOMMENDATION_LIMIT);
    if limit == 0 || limit > MAX_RECOMMENDATION_LIMIT {
        return Err(api_error(
            ValidationError::InvalidField {
                field: "limit",
                reason: format!("must be between 1 and {}", MAX_RECOMMENDATION_LIMIT),
            }
            .into(),
        ));
    }

    let user = match (request.profile, request.profile_id) {
        (Some(profile), _) => profile,
        (None, Some(id)) => {
            let stored = state.sync.get_profile(id).await.map_err(api_error)?;
            stored.training_profile().ok_or_else(|| {
                api_error(
                    ValidationError::InvalidField {
                        field: "profile_id",
                        reason: "profile is missing training fields".to_string(),
                    }
                    .into(),
                )
            })?
        }
        (None, None) => return Err(api_error(ValidationError::MissingField("profile").into())),
    };

    state
        .recommendations
        .recommend(&user, limit)
        .await
        .map(Json)
        .map_err(api_error)
}

#[derive(Debug, Deserialize)]
struct NutritionParams {
    #[serde(default)]
    days: Option<usize>,
}

async fn recent_nutrition_handler(
    State(state): State<AppState>,
    Query(params): Query<NutritionParams>,
) -> ApiResult<Json<Vec<DailyNutritionSummary>>> {
    let days = params.days.unwrap_or(DEFAULT_NUTRITION_DAYS);
    if days == 0 || days > state.nutrition_window_days {
        return Err(api_error(
            ValidationError::InvalidField {
                field: "days",
                reason: format!("must be between 1 and {}", state.nutrition_window_days),
            }
            .into(),
        ));
    }
    state.nutrition.recent(days).await.map(Json).map_err(api_error)
}

async fn get_nutrition_handler(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> ApiResult<Json<DailyNutritionSummary>> {
    match state.nutrition.get(date).await.map_err(api_error)? {
        Some(summary) => Ok(Json(summary)),
        None => Err(api_error(ServiceError::NotFound { key: date.to_string() })),
    }
}

/// Totals for one day; the date comes from the path
#[derive(Debug, Serialize, Deserialize)]
pub struct NutritionUpdateRequest {
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub fiber: f64,
    #[serde(default)]
    pub water_ml: f64,
    #[serde(default)]
    pub meal_count: u32,
}

async fn put_nutrition_handler(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
    Json(request): Json<NutritionUpdateRequest>,
) -> ApiResult<Json<DailyNutritionSummary>> {
    let totals = [
        ("calories", request.calories),
        ("protein", request.protein),
        ("carbs", request.carbs),
        ("fat", request.fat),
        ("fiber", request.fiber),
        ("water_ml", request.water_ml),
    ];
    if let Some((field, value)) = totals.iter().find(|(_, value)| !value.is_finite() || *value < 0.0) {
        return Err(api_error(
            ValidationError::InvalidField {
                field: *field,
                reason: format!("{} must be a non-negative number", value),
            }
            .into(),
        ));
    }

    let summary = DailyNutritionSummary {
        date,
        calories: request.calories,
        protein: request.protein,
        carbs: request.carbs,
        fat: request.fat,
        fiber: request.fiber,
        water_ml: request.water_ml,
        meal_count: request.meal_count,
        updated_at: Utc::now(),
    };
    state.nutrition.put(&summary).await.map_err(api_error)?;
    Ok(Json(summary))
}

/// Handler for health check endpoint
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match &state.database {
        Some(database) => match database.health_check().await {
            Ok(()) => "healthy",
            Err(e) => {
                warn!("Health check degraded: {}", e);
                "degraded"
            }
        },
        None => "healthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
    })
}

async fn metrics_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = state.metrics.gather().map_err(api_error)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

/// Error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Health check response structure
#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}
