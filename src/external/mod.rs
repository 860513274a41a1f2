/// Third-party product database
///
/// Last-resort food source. Not-found is a normal `None`/empty result; network and
/// rate-limit failures surface as errors for the caller to absorb.

pub mod open_food_facts;

pub use open_food_facts::OpenFoodFactsClient;

use crate::error::ServiceResult;
use crate::types::FoodItem;
use async_trait::async_trait;

#[async_trait]
pub trait ExternalFoodSource: Send + Sync {
    async fn get_by_key(&self, key: &str) -> ServiceResult<Option<FoodItem>>;

    async fn search(&self, query: &str, limit: usize) -> ServiceResult<Vec<FoodItem>>;
}
