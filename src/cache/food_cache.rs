use super::{LocalFoodStore, LocalStore};
use crate::config::MIN_QUERY_LENGTH;
use crate::error::{ServiceError, ServiceResult};
use crate::observability::Metrics;
use crate::search::ranking::normalize_text;
use crate::types::FoodItem;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use std::sync::Arc;
use tracing::{debug, warn};

const SELECT_COLUMNS: &str = "
    SELECT barcode, name, brand, calories, protein, carbs, fat, fiber, sugar, sodium,
           serving_size, nutriscore_grade, nova_group, usage_count, last_used_at, cached_at
    FROM food_items
";

/// Capacity-bounded food cache on the local store.
///
/// When an insert pushes the row count over capacity, the least used rows (oldest
/// `last_used_at` first among equals) are deleted until the table is back at capacity.
/// The row that triggered the eviction is never a candidate.
pub struct LocalFoodCache {
    store: Arc<LocalStore>,
    capacity: usize,
    metrics: Option<Arc<Metrics>>,
}

impl LocalFoodCache {
    pub fn new(store: Arc<LocalStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached food items
    pub async fn count(&self) -> ServiceResult<usize> {
        self.store
            .run(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM food_items", [], |row| row.get(0))
                    .map_err(|e| ServiceError::CacheError(format!("Failed to count food items: {}", e)))?;
                Ok(count as usize)
            })
            .await
    }

    /// Remove every cached food item
    pub async fn clear(&self) -> ServiceResult<()> {
        self.store
            .run(|conn| {
                conn.execute("DELETE FROM food_items", [])
                    .map_err(|e| ServiceError::CacheError(format!("Failed to clear food items: {}", e)))?;
                Ok(())
            })
            .await
    }

    /// Most used items, for quick-add lists
    pub async fn top_used(&self, limit: usize) -> ServiceResult<Vec<FoodItem>> {
        self.store
            .run(move |conn| {
                let sql = format!("{} ORDER BY usage_count DESC, last_used_at DESC LIMIT ?1", SELECT_COLUMNS);
                query_items(conn, &sql, params![limit as i64])
            })
            .await
    }
}

/// Delete overflow rows, keeping `keep_key`. Returns the number of evicted rows.
fn evict_overflow(conn: &Connection, capacity: usize, keep_key: &str) -> rusqlite::Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM food_items", [], |row| row.get(0))?;
    let overflow = count - capacity as i64;
    if overflow <= 0 {
        return Ok(0);
    }

    conn.execute(
        "DELETE FROM food_items WHERE barcode IN (
            SELECT barcode FROM food_items
            WHERE barcode != ?1
            ORDER BY usage_count ASC, last_used_at ASC, rowid ASC
            LIMIT ?2
        )",
        params![keep_key, overflow],
    )
}

fn query_items(conn: &Connection, sql: &str, params: impl Params) -> ServiceResult<Vec<FoodItem>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| ServiceError::CacheError(format!("Failed to prepare food query: {}", e)))?;
    let rows = stmt
        .query_map(params, row_to_item)
        .map_err(|e| ServiceError::CacheError(format!("Food query failed: {}", e)))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServiceError::CacheError(format!("Failed to read food item row: {}", e)))
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<FoodItem> {
    Ok(FoodItem {
        key: row.get(0)?,
        name: row.get(1)?,
        brand: row.get(2)?,
        calories: row.get(3)?,
        protein: row.get(4)?,
        carbs: row.get(5)?,
        fat: row.get(6)?,
        fiber: row.get(7)?,
        sugar: row.get(8)?,
        sodium: row.get(9)?,
        serving_size: row.get(10)?,
        nutriscore_grade: row.get(11)?,
        nova_group: row.get(12)?,
        usage_count: row.get(13)?,
        last_used_at: row.get(14)?,
        cached_at: row.get(15)?,
    })
}

/// Escape LIKE wildcards so user input matches literally
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl LocalFoodStore for LocalFoodCache {
    async fn get_by_key(&self, key: &str) -> ServiceResult<Option<FoodItem>> {
        let key = key.to_string();
        self.store
            .run(move |conn| {
                let updated = conn
                    .execute(
                        "UPDATE food_items SET usage_count = usage_count + 1, last_used_at = ?2 WHERE barcode = ?1",
                        params![key, Utc::now()],
                    )
                    .map_err(|e| ServiceError::CacheError(format!("Failed to record local hit: {}", e)))?;

                if updated == 0 {
                    debug!("Local miss for {}", key);
                    return Ok(None);
                }

                let sql = format!("{} WHERE barcode = ?1", SELECT_COLUMNS);
                conn.query_row(&sql, params![key], row_to_item)
                    .optional()
                    .map_err(|e| ServiceError::CacheError(format!("Failed to read food item: {}", e)))
            })
            .await
    }

    async fn put(&self, item: &FoodItem) -> ServiceResult<()> {
        let item = item.clone();
        let capacity = self.capacity;
        let evicted = self
            .store
            .run(move |conn| {
                let now = Utc::now();
                conn.execute(
                    "INSERT INTO food_items (
                        barcode, name, search_name, brand, calories, protein, carbs, fat, fiber,
                        sugar, sodium, serving_size, nutriscore_grade, nova_group,
                        usage_count, last_used_at, cached_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 1, ?15, ?15)
                    ON CONFLICT(barcode) DO UPDATE SET
                        name = excluded.name,
                        search_name = excluded.search_name,
                        brand = COALESCE(excluded.brand, food_items.brand),
                        calories = COALESCE(excluded.calories, food_items.calories),
                        protein = COALESCE(excluded.protein, food_items.protein),
                        carbs = COALESCE(excluded.carbs, food_items.carbs),
                        fat = COALESCE(excluded.fat, food_items.fat),
                        fiber = COALESCE(excluded.fiber, food_items.fiber),
                        sugar = COALESCE(excluded.sugar, food_items.sugar),
                        sodium = COALESCE(excluded.sodium, food_items.sodium),
                        serving_size = COALESCE(excluded.serving_size, food_items.serving_size),
                        nutriscore_grade = COALESCE(excluded.nutriscore_grade, food_items.nutriscore_grade),
                        nova_group = COALESCE(excluded.nova_group, food_items.nova_group),
                        usage_count = food_items.usage_count + 1,
                        last_used_at = excluded.last_used_at,
                        cached_at = excluded.cached_at",
                    params![
                        item.key,
                        item.name,
                        normalize_text(&item.name),
                        item.brand,
                        item.calories,
                        item.protein,
                        item.carbs,
                        item.fat,
                        item.fiber,
                        item.sugar,
                        item.sodium,
                        item.serving_size,
                        item.nutriscore_grade,
                        item.nova_group,
                        now,
                    ],
                )
                .map_err(|e| ServiceError::CacheError(format!("Failed to cache food item: {}", e)))?;

                // Eviction failure never fails the insert
                match evict_overflow(conn, capacity, &item.key) {
                    Ok(evicted) => Ok(evicted),
                    Err(e) => {
                        warn!("Local eviction failed after caching {}: {}", item.key, e);
                        Ok(0)
                    }
                }
            })
            .await?;

        if evicted > 0 {
            debug!("Evicted {} local food items", evicted);
            if let Some(metrics) = &self.metrics {
                metrics.local_evictions_total.inc_by(evicted as f64);
            }
        }

        Ok(())
    }

    async fn search_by_name(&self, query: &str, limit: usize) -> ServiceResult<Vec<FoodItem>> {
        let trimmed = query.trim();
        if trimmed.chars().count() < MIN_QUERY_LENGTH || limit == 0 {
            return Ok(Vec::new());
        }

        let pattern = format!("%{}%", escape_like(&normalize_text(trimmed)));
        self.store
            .run(move |conn| {
                let sql = format!(
                    "{} WHERE search_name LIKE ?1 ESCAPE '\\' ORDER BY usage_count DESC, last_used_at DESC LIMIT ?2",
                    SELECT_COLUMNS
                );
                query_items(conn, &sql, params![pattern, limit as i64])
            })
            .await
    }
}
