use super::postgres_client::{get_connection, PostgresClient};
use super::PlanCatalog;
use crate::error::{ServiceError, ServiceResult};
use crate::recommendation::{CompletionStatus, PlanTemplate};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use tracing::debug;

/// Read-only view over the `plan_templates` table
pub struct PostgresPlanCatalog {
    pool: Pool,
}

impl PostgresPlanCatalog {
    pub fn new(client: &PostgresClient) -> Self {
        Self { pool: client.pool() }
    }
}

fn row_to_template(row: &Row) -> PlanTemplate {
    let fitness_level: Option<String> = row.get(2);
    let days_per_week: i16 = row.get(3);
    let primary_goal: Option<String> = row.get(4);
    let min_months: i32 = row.get(5);
    let exercises_per_workout: Option<i32> = row.get(6);
    let estimated_sets_per_week: Option<i32> = row.get(7);
    let completion_status: String = row.get(8);

    PlanTemplate {
        id: row.get(0),
        name: row.get(1),
        fitness_level: fitness_level.and_then(|level| level.parse().ok()),
        days_per_week: days_per_week.clamp(0, 7) as u8,
        primary_goal: primary_goal.and_then(|goal| goal.parse().ok()),
        min_training_experience_months: min_months.max(0) as u32,
        exercises_per_workout: exercises_per_workout.map(|n| n.max(0) as u32),
        estimated_sets_per_week: estimated_sets_per_week.map(|n| n.max(0) as u32),
        completion_status: CompletionStatus::from_catalog(&completion_status),
    }
}

#[async_trait]
impl PlanCatalog for PostgresPlanCatalog {
    async fn active_templates(&self) -> ServiceResult<Vec<PlanTemplate>> {
        let client = get_connection(&self.pool).await?;
        let rows = client
            .query(
                "SELECT id, name, fitness_level, days_per_week, primary_goal,
                        min_training_experience_months, exercises_per_workout,
                        estimated_sets_per_week, completion_status
                 FROM plan_templates
                 WHERE is_active
                 ORDER BY name",
                &[],
            )
            .await
            .map_err(|e| ServiceError::DatabaseError(format!("Failed to load plan templates: {}", e)))?;

        debug!("Loaded {} active plan templates", rows.len());
        Ok(rows.iter().map(row_to_template).collect())
    }
}
