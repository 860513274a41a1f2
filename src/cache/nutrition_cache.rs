use super::{LocalNutritionStore, LocalStore};
use crate::error::{ServiceError, ServiceResult};
use crate::types::DailyNutritionSummary;
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;
use tracing::{debug, warn};

/// Rolling window of daily nutrition summaries, one row per date.
/// Once the window is exceeded the oldest dates are dropped first.
pub struct DailyNutritionCache {
    store: Arc<LocalStore>,
    window_days: usize,
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<DailyNutritionSummary> {
    Ok(DailyNutritionSummary {
        date: row.get(0)?,
        calories: row.get(1)?,
        protein: row.get(2)?,
        carbs: row.get(3)?,
        fat: row.get(4)?,
        fiber: row.get(5)?,
        water_ml: row.get(6)?,
        meal_count: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl DailyNutritionCache {
    pub fn new(store: Arc<LocalStore>, window_days: usize) -> Self {
        Self { store, window_days }
    }

    pub fn window_days(&self) -> usize {
        self.window_days
    }

    pub async fn count(&self) -> ServiceResult<usize> {
        self.store
            .run(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM daily_nutrition", [], |row| row.get(0))
                    .map_err(|e| ServiceError::CacheError(format!("Failed to count nutrition summaries: {}", e)))?;
                Ok(count as usize)
            })
            .await
    }
}

#[async_trait]
impl LocalNutritionStore for DailyNutritionCache {
    async fn get(&self, date: NaiveDate) -> ServiceResult<Option<DailyNutritionSummary>> {
        self.store
            .run(move |conn| {
                conn.query_row(
                    "SELECT date, calories, protein, carbs, fat, fiber, water_ml, meal_count, updated_at
                     FROM daily_nutrition WHERE date = ?1",
                    params![date],
                    row_to_summary,
                )
                .optional()
                .map_err(|e| ServiceError::CacheError(format!("Failed to read nutrition summary: {}", e)))
            })
            .await
    }

    /// Upsert the summary for its date, then trim the window
    async fn put(&self, summary: &DailyNutritionSummary) -> ServiceResult<()> {
        let summary = summary.clone();
        let window_days = self.window_days;
        self.store
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO daily_nutrition (date, calories, protein, carbs, fat, fiber, water_ml, meal_count, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(date) DO UPDATE SET
                        calories = excluded.calories,
                        protein = excluded.protein,
                        carbs = excluded.carbs,
                        fat = excluded.fat,
                        fiber = excluded.fiber,
                        water_ml = excluded.water_ml,
                        meal_count = excluded.meal_count,
                        updated_at = excluded.updated_at",
                    params![
                        summary.date,
                        summary.calories,
                        summary.protein,
                        summary.carbs,
                        summary.fat,
                        summary.fiber,
                        summary.water_ml,
                        summary.meal_count,
                        summary.updated_at,
                    ],
                )
                .map_err(|e| ServiceError::CacheError(format!("Failed to cache nutrition summary: {}", e)))?;

                let trimmed = conn.execute(
                    "DELETE FROM daily_nutrition WHERE date NOT IN (
                        SELECT date FROM daily_nutrition ORDER BY date DESC LIMIT ?1
                    )",
                    params![window_days as i64],
                );
                match trimmed {
                    Ok(0) => {}
                    Ok(removed) => debug!("Dropped {} nutrition days outside the window", removed),
                    Err(e) => warn!("Failed to trim nutrition window: {}", e),
                }

                Ok(())
            })
            .await
    }

    /// Newest first
    async fn recent(&self, limit: usize) -> ServiceResult<Vec<DailyNutritionSummary>> {
        self.store
            .run(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT date, calories, protein, carbs, fat, fiber, water_ml, meal_count, updated_at
                         FROM daily_nutrition ORDER BY date DESC LIMIT ?1",
                    )
                    .map_err(|e| ServiceError::CacheError(format!("Failed to prepare nutrition query: {}", e)))?;
                let rows = stmt
                    .query_map(params![limit as i64], row_to_summary)
                    .map_err(|e| ServiceError::CacheError(format!("Failed to query nutrition summaries: {}", e)))?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ServiceError::CacheError(format!("Failed to read nutrition row: {}", e)))
            })
            .await
    }
}
