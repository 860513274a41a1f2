use super::{LocalProfileStore, LocalStore};
use crate::error::{ServiceError, ServiceResult};
use crate::types::{ProfileUpdate, StoredProfile};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use uuid::Uuid;

/// Profiles cached locally as JSON documents keyed by user id
pub struct LocalProfileCache {
    store: Arc<LocalStore>,
}

impl LocalProfileCache {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }
}

fn read_profile(conn: &Connection, id: Uuid) -> ServiceResult<Option<StoredProfile>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM profiles WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| ServiceError::CacheError(format!("Failed to read cached profile: {}", e)))?;

    match data {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn write_profile(conn: &Connection, profile: &StoredProfile) -> ServiceResult<()> {
    let data = serde_json::to_string(profile)?;
    conn.execute(
        "INSERT INTO profiles (id, data, cached_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET data = excluded.data, cached_at = excluded.cached_at",
        params![profile.id.to_string(), data, Utc::now()],
    )
    .map_err(|e| ServiceError::CacheError(format!("Failed to cache profile: {}", e)))?;
    Ok(())
}

#[async_trait]
impl LocalProfileStore for LocalProfileCache {
    async fn get(&self, id: Uuid) -> ServiceResult<Option<StoredProfile>> {
        self.store.run(move |conn| read_profile(conn, id)).await
    }

    async fn put(&self, profile: &StoredProfile) -> ServiceResult<()> {
        let profile = profile.clone();
        self.store.run(move |conn| write_profile(conn, &profile)).await
    }

    async fn apply_update(&self, id: Uuid, update: &ProfileUpdate) -> ServiceResult<bool> {
        let update = update.clone();
        self.store
            .run(move |conn| {
                let Some(mut profile) = read_profile(conn, id)? else {
                    return Ok(false);
                };
                profile.apply(&update);
                write_profile(conn, &profile)?;
                Ok(true)
            })
            .await
    }

    async fn update_image(&self, id: Uuid, image_url: &str) -> ServiceResult<bool> {
        let image_url = image_url.to_string();
        self.store
            .run(move |conn| {
                let Some(mut profile) = read_profile(conn, id)? else {
                    return Ok(false);
                };
                profile.profile_image_url = Some(image_url);
                profile.updated_at = Utc::now();
                write_profile(conn, &profile)?;
                Ok(true)
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> ServiceResult<()> {
        self.store
            .run(move |conn| {
                conn.execute("DELETE FROM profiles WHERE id = ?1", params![id.to_string()])
                    .map_err(|e| ServiceError::CacheError(format!("Failed to delete cached profile: {}", e)))?;
                Ok(())
            })
            .await
    }
}
