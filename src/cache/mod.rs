/// Local tier
///
/// Embedded SQLite store holding the device-local caches:
/// - Food items (LRU by usage count, fixed capacity)
/// - Daily nutrition summaries (FIFO by date, rolling window)
/// - User profiles (kept consistent by the sync service)

pub mod food_cache;
pub mod nutrition_cache;
pub mod profile_cache;
pub mod store;

#[cfg(test)]
mod tests;

pub use food_cache::LocalFoodCache;
pub use nutrition_cache::DailyNutritionCache;
pub use profile_cache::LocalProfileCache;
pub use store::LocalStore;

use crate::error::ServiceResult;
use crate::types::{DailyNutritionSummary, FoodItem, ProfileUpdate, StoredProfile};
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

/// Fastest food tier, consulted first on every read
#[async_trait]
pub trait LocalFoodStore: Send + Sync {
    /// Look up by barcode, bumping usage on hit
    async fn get_by_key(&self, key: &str) -> ServiceResult<Option<FoodItem>>;

    /// Upsert; new keys start at usage 1, existing keys have usage bumped
    async fn put(&self, item: &FoodItem) -> ServiceResult<()>;

    /// Case-insensitive substring match on name, most used first
    async fn search_by_name(&self, query: &str, limit: usize) -> ServiceResult<Vec<FoodItem>>;
}

/// Local copy of user profiles
#[async_trait]
pub trait LocalProfileStore: Send + Sync {
    async fn get(&self, id: Uuid) -> ServiceResult<Option<StoredProfile>>;

    async fn put(&self, profile: &StoredProfile) -> ServiceResult<()>;

    /// Merge a partial update into the cached copy. Returns false if nothing was cached.
    async fn apply_update(&self, id: Uuid, update: &ProfileUpdate) -> ServiceResult<bool>;

    /// Returns false if nothing was cached
    async fn update_image(&self, id: Uuid, image_url: &str) -> ServiceResult<bool>;

    async fn delete(&self, id: Uuid) -> ServiceResult<()>;
}

/// Local daily nutrition summaries, one per date
#[async_trait]
pub trait LocalNutritionStore: Send + Sync {
    async fn get(&self, date: NaiveDate) -> ServiceResult<Option<DailyNutritionSummary>>;

    /// Replace the summary for its date
    async fn put(&self, summary: &DailyNutritionSummary) -> ServiceResult<()>;

    /// Newest first
    async fn recent(&self, limit: usize) -> ServiceResult<Vec<DailyNutritionSummary>>;
}
