use super::postgres_client::{get_connection, PostgresClient};
use super::SharedFoodStore;
use crate::config::MIN_QUERY_LENGTH;
use crate::error::{ServiceError, ServiceResult};
use crate::types::FoodItem;
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use tracing::{debug, warn};

const SELECT_COLUMNS: &str = "
    SELECT barcode, name, brand, calories, protein, carbs, fat, fiber, sugar, sodium,
           serving_size, nutriscore_grade, nova_group, usage_count, last_used_at, cached_at
    FROM food_cache
";

/// Food cache shared by every user, backed by Postgres.
///
/// Name search tries the generated `search_vector` first and falls back to
/// `name ILIKE '%q%' OR brand ILIKE '%q%'` when full-text search finds nothing or fails.
/// Hit counting is fire-and-forget.
pub struct RemoteFoodCache {
    pool: Pool,
}

impl RemoteFoodCache {
    pub fn new(client: &PostgresClient) -> Self {
        Self { pool: client.pool() }
    }

    /// Best-effort usage increment for `key`
    pub async fn record_usage(&self, key: &str) -> ServiceResult<()> {
        record_usage(&self.pool, key).await
    }

    fn spawn_usage_bump(&self, key: &str) {
        let pool = self.pool.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = record_usage(&pool, &key).await {
                warn!("Failed to record shared cache hit for {}: {}", key, e);
            }
        });
    }

    async fn full_text_search(&self, query: &str, limit: i64) -> ServiceResult<Vec<FoodItem>> {
        let client = get_connection(&self.pool).await?;
        let sql = format!(
            "{} WHERE search_vector @@ plainto_tsquery('simple', $1)
             ORDER BY ts_rank(search_vector, plainto_tsquery('simple', $1)) DESC, usage_count DESC
             LIMIT $2",
            SELECT_COLUMNS
        );
        let rows = client
            .query(sql.as_str(), &[&query, &limit])
            .await
            .map_err(|e| ServiceError::DatabaseError(format!("Full-text search failed: {}", e)))?;
        Ok(rows.iter().map(row_to_item).collect())
    }

    async fn pattern_search(&self, query: &str, limit: i64) -> ServiceResult<Vec<FoodItem>> {
        let client = get_connection(&self.pool).await?;
        let pattern = ilike_pattern(query);
        let sql = format!(
            "{} WHERE name ILIKE $1 OR brand ILIKE $1 ORDER BY usage_count DESC LIMIT $2",
            SELECT_COLUMNS
        );
        let rows = client
            .query(sql.as_str(), &[&pattern, &limit])
            .await
            .map_err(|e| ServiceError::DatabaseError(format!("Pattern search failed: {}", e)))?;
        Ok(rows.iter().map(row_to_item).collect())
    }
}

async fn record_usage(pool: &Pool, key: &str) -> ServiceResult<()> {
    let client = get_connection(pool).await?;
    client
        .execute(
            "UPDATE food_cache SET usage_count = usage_count + 1, last_used_at = NOW() WHERE barcode = $1",
            &[&key],
        )
        .await
        .map_err(|e| ServiceError::DatabaseError(format!("Failed to increment usage: {}", e)))?;
    Ok(())
}

/// `%q%` with ILIKE wildcards in `q` escaped
fn ilike_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn row_to_item(row: &Row) -> FoodItem {
    let usage_count: i32 = row.get(13);
    FoodItem {
        key: row.get(0),
        name: row.get(1),
        brand: row.get(2),
        calories: row.get(3),
        protein: row.get(4),
        carbs: row.get(5),
        fat: row.get(6),
        fiber: row.get(7),
        sugar: row.get(8),
        sodium: row.get(9),
        serving_size: row.get(10),
        nutriscore_grade: row.get(11),
        nova_group: row.get(12),
        usage_count: usage_count.max(1) as u32,
        last_used_at: row.get(14),
        cached_at: row.get(15),
    }
}

#[async_trait]
impl SharedFoodStore for RemoteFoodCache {
    async fn get_by_key(&self, key: &str) -> ServiceResult<Option<FoodItem>> {
        let client = get_connection(&self.pool).await?;
        let sql = format!("{} WHERE barcode = $1", SELECT_COLUMNS);
        let row = client
            .query_opt(sql.as_str(), &[&key])
            .await
            .map_err(|e| ServiceError::DatabaseError(format!("Failed to get food item: {}", e)))?;

        match row {
            Some(row) => {
                self.spawn_usage_bump(key);
                Ok(Some(row_to_item(&row)))
            }
            None => {
                debug!("Shared cache miss for {}", key);
                Ok(None)
            }
        }
    }

    async fn put(&self, item: &FoodItem) -> ServiceResult<()> {
        let client = get_connection(&self.pool).await?;
        client
            .execute(
                "INSERT INTO food_cache (
                    barcode, name, brand, calories, protein, carbs, fat, fiber, sugar, sodium,
                    serving_size, nutriscore_grade, nova_group, usage_count, last_used_at, cached_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 1, NOW(), NOW())
                ON CONFLICT (barcode) DO UPDATE SET
                    name = EXCLUDED.name,
                    brand = COALESCE(EXCLUDED.brand, food_cache.brand),
                    calories = COALESCE(EXCLUDED.calories, food_cache.calories),
                    protein = COALESCE(EXCLUDED.protein, food_cache.protein),
                    carbs = COALESCE(EXCLUDED.carbs, food_cache.carbs),
                    fat = COALESCE(EXCLUDED.fat, food_cache.fat),
                    fiber = COALESCE(EXCLUDED.fiber, food_cache.fiber),
                    sugar = COALESCE(EXCLUDED.sugar, food_cache.sugar),
                    sodium = COALESCE(EXCLUDED.sodium, food_cache.sodium),
                    serving_size = COALESCE(EXCLUDED.serving_size, food_cache.serving_size),
                    nutriscore_grade = COALESCE(EXCLUDED.nutriscore_grade, food_cache.nutriscore_grade),
                    nova_group = COALESCE(EXCLUDED.nova_group, food_cache.nova_group),
                    usage_count = food_cache.usage_count + 1,
                    last_used_at = NOW(),
                    cached_at = NOW()",
                &[
                    &item.key,
                    &item.name,
                    &item.brand,
                    &item.calories,
                    &item.protein,
                    &item.carbs,
                    &item.fat,
                    &item.fiber,
                    &item.sugar,
                    &item.sodium,
                    &item.serving_size,
                    &item.nutriscore_grade,
                    &item.nova_group,
                ],
            )
            .await
            .map_err(|e| ServiceError::DatabaseError(format!("Failed to upsert food item: {}", e)))?;

        debug!("Cached {} in shared cache", item.key);
        Ok(())
    }

    async fn search_by_name(&self, query: &str, limit: usize) -> ServiceResult<Vec<FoodItem>> {
        let trimmed = query.trim();
        if trimmed.chars().count() < MIN_QUERY_LENGTH || limit == 0 {
            return Ok(Vec::new());
        }
        let limit = limit as i64;

        match self.full_text_search(trimmed, limit).await {
            Ok(items) if !items.is_empty() => {
                debug!("Full-text search returned {} shared items", items.len());
                return Ok(items);
            }
            Ok(_) => debug!("Full-text search found nothing, falling back to pattern match"),
            Err(e) => warn!("Full-text search failed, falling back to pattern match: {}", e),
        }

        self.pattern_search(trimmed, limit).await
    }

    async fn get_most_used(&self, limit: usize) -> ServiceResult<Vec<FoodItem>> {
        let client = get_connection(&self.pool).await?;
        let sql = format!("{} ORDER BY usage_count DESC, last_used_at DESC LIMIT $1", SELECT_COLUMNS);
        let rows = client
            .query(sql.as_str(), &[&(limit as i64)])
            .await
            .map_err(|e| ServiceError::DatabaseError(format!("Failed to load most used items: {}", e)))?;
        Ok(rows.iter().map(row_to_item).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ilike_pattern_escapes_wildcards() {
        assert_eq!(ilike_pattern("quark"), "%quark%");
        assert_eq!(ilike_pattern("50%_fett"), "%50\\%\\_fett%");
    }
}
