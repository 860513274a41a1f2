pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod external;
pub mod observability;
pub mod recommendation;
pub mod search;
pub mod server;
pub mod sync;
pub mod types;

pub use cache::{DailyNutritionCache, LocalFoodCache, LocalProfileCache, LocalStore};
pub use config::Config;
pub use database::{PostgresClient, PostgresPlanCatalog, PostgresProfileStore, RemoteFoodCache};
pub use error::{ServiceError, ServiceResult, ValidationError};
pub use external::OpenFoodFactsClient;
pub use recommendation::{PlanRecommendation, PlanTemplate, RecommendationService};
pub use search::FoodService;
pub use server::{AppState, FitfuelServer};
pub use sync::{EventBus, SyncService};
pub use types::*;
