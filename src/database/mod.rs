/// Database module
///
/// Postgres-backed collaborators: the food cache shared by all users, the profile
/// store and the plan template catalog. All three share one deadpool connection pool.

mod plan_catalog;
mod postgres_client;
mod profile_store;
mod remote_food_cache;
mod schema;

#[cfg(test)]
mod tests;

use crate::error::ServiceResult;
use crate::recommendation::PlanTemplate;
use crate::types::{FoodItem, ProfileUpdate, StoredProfile};
use async_trait::async_trait;
use uuid::Uuid;

pub use plan_catalog::PostgresPlanCatalog;
pub use postgres_client::PostgresClient;
pub use profile_store::PostgresProfileStore;
pub use remote_food_cache::RemoteFoodCache;
pub use schema::{DatabaseSchema, Migration, Migrations};

/// Food tier shared across all users
#[async_trait]
pub trait SharedFoodStore: Send + Sync {
    /// Look up by barcode; a hit schedules a usage increment without waiting for it
    async fn get_by_key(&self, key: &str) -> ServiceResult<Option<FoodItem>>;

    /// Upsert; existing rows merge fields and bump usage
    async fn put(&self, item: &FoodItem) -> ServiceResult<()>;

    /// Full-text search, falling back to a name/brand pattern match
    async fn search_by_name(&self, query: &str, limit: usize) -> ServiceResult<Vec<FoodItem>>;

    /// Globally most used items, for background prefetch only
    async fn get_most_used(&self, limit: usize) -> ServiceResult<Vec<FoodItem>>;
}

/// Remote source of truth for user profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, id: Uuid) -> ServiceResult<Option<StoredProfile>>;

    /// Apply a partial update and return the stored result
    async fn update(&self, id: Uuid, update: &ProfileUpdate) -> ServiceResult<StoredProfile>;

    async fn update_image(&self, id: Uuid, image_url: &str) -> ServiceResult<()>;

    async fn delete(&self, id: Uuid) -> ServiceResult<()>;
}

/// Catalog of training plan templates
#[async_trait]
pub trait PlanCatalog: Send + Sync {
    async fn active_templates(&self) -> ServiceResult<Vec<PlanTemplate>>;
}
