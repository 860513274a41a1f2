use super::postgres_client::{get_connection, PostgresClient};
use super::ProfileStore;
use crate::error::{ServiceError, ServiceResult};
use crate::types::{ProfileUpdate, StoredProfile};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use tracing::{debug, info};
use uuid::Uuid;

const RETURNING_COLUMNS: &str = "id, display_name, profile_image_url, fitness_level, \
    training_experience_months, available_training_days, primary_goal, updated_at";

/// Remote profile table, the source of truth for user profiles
pub struct PostgresProfileStore {
    pool: Pool,
}

impl PostgresProfileStore {
    pub fn new(client: &PostgresClient) -> Self {
        Self { pool: client.pool() }
    }
}

/// Unknown enum strings become `None` rather than failing the whole row
fn row_to_profile(row: &Row) -> StoredProfile {
    let fitness_level: Option<String> = row.get(3);
    let months: Option<i32> = row.get(4);
    let days: Option<i16> = row.get(5);
    let goal: Option<String> = row.get(6);

    StoredProfile {
        id: row.get(0),
        display_name: row.get(1),
        profile_image_url: row.get(2),
        fitness_level: fitness_level.and_then(|level| level.parse().ok()),
        training_experience_months: months.map(|m| m.max(0) as u32),
        available_training_days: days.map(|d| d.clamp(0, 7) as u8),
        primary_goal: goal.and_then(|goal| goal.parse().ok()),
        updated_at: row.get(7),
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn get(&self, id: Uuid) -> ServiceResult<Option<StoredProfile>> {
        let client = get_connection(&self.pool).await?;
        let sql = format!("SELECT {} FROM profiles WHERE id = $1", RETURNING_COLUMNS);
        let row = client
            .query_opt(sql.as_str(), &[&id])
            .await
            .map_err(|e| ServiceError::DatabaseError(format!("Failed to get profile: {}", e)))?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn update(&self, id: Uuid, update: &ProfileUpdate) -> ServiceResult<StoredProfile> {
        let client = get_connection(&self.pool).await?;
        let fitness_level = update.fitness_level.map(|level| level.as_str());
        let months = update.training_experience_months.map(|m| m as i32);
        let days = update.available_training_days.map(|d| d as i16);
        let goal = update.primary_goal.map(|goal| goal.as_str());

        let sql = format!(
            "INSERT INTO profiles (id, display_name, fitness_level, training_experience_months,
                                   available_training_days, primary_goal, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, NOW())
             ON CONFLICT (id) DO UPDATE SET
                display_name = COALESCE(EXCLUDED.display_name, profiles.display_name),
                fitness_level = COALESCE(EXCLUDED.fitness_level, profiles.fitness_level),
                training_experience_months = COALESCE(EXCLUDED.training_experience_months, profiles.training_experience_months),
                available_training_days = COALESCE(EXCLUDED.available_training_days, profiles.available_training_days),
                primary_goal = COALESCE(EXCLUDED.primary_goal, profiles.primary_goal),
                updated_at = NOW()
             RETURNING {}",
            RETURNING_COLUMNS
        );

        let row = client
            .query_one(
                sql.as_str(),
                &[&id, &update.display_name, &fitness_level, &months, &days, &goal],
            )
            .await
            .map_err(|e| ServiceError::DatabaseError(format!("Failed to update profile: {}", e)))?;

        debug!("Updated profile {}", id);
        Ok(row_to_profile(&row))
    }

    async fn update_image(&self, id: Uuid, image_url: &str) -> ServiceResult<()> {
        let client = get_connection(&self.pool).await?;
        let updated = client
            .execute(
                "UPDATE profiles SET profile_image_url = $2, updated_at = NOW() WHERE id = $1",
                &[&id, &image_url],
            )
            .await
            .map_err(|e| ServiceError::DatabaseError(format!("Failed to update profile image: {}", e)))?;

        if updated == 0 {
            return Err(ServiceError::NotFound { key: id.to_string() });
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> ServiceResult<()> {
        let client = get_connection(&self.pool).await?;
        client
            .execute("DELETE FROM profiles WHERE id = $1", &[&id])
            .await
            .map_err(|e| ServiceError::DatabaseError(format!("Failed to delete profile: {}", e)))?;

        info!("Deleted profile {}", id);
        Ok(())
    }
}
