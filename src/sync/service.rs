use super::event_bus::{EventBus, ProfileEvent, ProfileEventKind, Subscription};
use crate::cache::LocalProfileStore;
use crate::database::ProfileStore;
use crate::error::{ServiceError, ServiceResult, ValidationError};
use crate::types::{ProfileUpdate, StoredProfile};
use futures::FutureExt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Keeps the local profile cache consistent with the remote profile store.
///
/// Writes go to the remote store first and then publish an event. The cache is
/// updated only by the listeners `initialize` subscribes, never by the write path.
pub struct SyncService {
    remote: Arc<dyn ProfileStore>,
    cache: Arc<dyn LocalProfileStore>,
    bus: Arc<EventBus>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SyncService {
    pub fn new(remote: Arc<dyn ProfileStore>, cache: Arc<dyn LocalProfileStore>, bus: Arc<EventBus>) -> Self {
        Self {
            remote,
            cache,
            bus,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn is_initialized(&self) -> bool {
        !self.subscriptions().is_empty()
    }

    /// Subscribe the cache listeners. Calling it again is a no-op.
    pub fn initialize(&self) {
        let mut subscriptions = self.subscriptions();
        if !subscriptions.is_empty() {
            debug!("Sync service already initialized");
            return;
        }

        let cache = self.cache.clone();
        let remote = self.remote.clone();
        subscriptions.push(self.bus.on(ProfileEventKind::Updated, move |event| {
            apply_profile_update(cache.clone(), remote.clone(), event).boxed()
        }));

        let cache = self.cache.clone();
        subscriptions.push(self.bus.on(ProfileEventKind::ImageUpdated, move |event| {
            apply_image_update(cache.clone(), event).boxed()
        }));

        let cache = self.cache.clone();
        subscriptions.push(self.bus.on(ProfileEventKind::Deleted, move |event| {
            let cache = cache.clone();
            async move { cache.delete(event.profile_id()).await }.boxed()
        }));

        info!("Sync service initialized with {} listeners", subscriptions.len());
    }

    /// Remove the cache listeners; `initialize` may be called again afterwards
    pub fn teardown(&self) {
        let subscriptions: Vec<Subscription> = self.subscriptions().drain(..).collect();
        let count = subscriptions.len();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        info!("Sync service torn down, removed {} listeners", count);
    }

    /// Cached profile if present, otherwise fetched remotely and cached
    #[instrument(skip(self))]
    pub async fn get_profile(&self, id: Uuid) -> ServiceResult<StoredProfile> {
        match self.cache.get(id).await {
            Ok(Some(profile)) => {
                debug!("Profile {} served from local cache", id);
                return Ok(profile);
            }
            Ok(None) => {}
            Err(e) => warn!("Local profile read failed for {}, using remote: {}", id, e),
        }

        let profile = self
            .remote
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound { key: id.to_string() })?;

        if let Err(e) = self.cache.put(&profile).await {
            warn!("Failed to cache profile {}: {}", id, e);
        }
        Ok(profile)
    }

    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> ServiceResult<StoredProfile> {
        validate_update(&update)?;

        let profile = self.remote.update(id, &update).await?;
        self.bus
            .emit(ProfileEvent::Updated {
                profile_id: id,
                changes: Some(update),
            })
            .await;
        Ok(profile)
    }

    #[instrument(skip(self, image_url))]
    pub async fn update_profile_image(&self, id: Uuid, image_url: &str) -> ServiceResult<()> {
        let image_url = image_url.trim();
        if image_url.is_empty() {
            return Err(ValidationError::MissingField("image_url").into());
        }

        self.remote.update_image(id, image_url).await?;
        self.bus
            .emit(ProfileEvent::ImageUpdated {
                profile_id: id,
                image_url: image_url.to_string(),
            })
            .await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_profile(&self, id: Uuid) -> ServiceResult<()> {
        self.remote.delete(id).await?;
        self.bus.emit(ProfileEvent::Deleted { profile_id: id }).await;
        Ok(())
    }

    /// Publish a full-refetch update for listeners, e.g. after an out-of-band change
    pub async fn refresh_profile(&self, id: Uuid) {
        self.bus
            .emit(ProfileEvent::Updated {
                profile_id: id,
                changes: None,
            })
            .await;
    }

    fn subscriptions(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn apply_profile_update(
    cache: Arc<dyn LocalProfileStore>,
    remote: Arc<dyn ProfileStore>,
    event: ProfileEvent,
) -> ServiceResult<()> {
    let ProfileEvent::Updated { profile_id, changes } = event else {
        return Ok(());
    };

    match changes {
        Some(changes) => {
            if !cache.apply_update(profile_id, &changes).await? {
                debug!("Profile {} not cached, skipping partial update", profile_id);
            }
        }
        None => match remote.get(profile_id).await? {
            Some(profile) => cache.put(&profile).await?,
            None => cache.delete(profile_id).await?,
        },
    }
    Ok(())
}

async fn apply_image_update(cache: Arc<dyn LocalProfileStore>, event: ProfileEvent) -> ServiceResult<()> {
    if let ProfileEvent::ImageUpdated { profile_id, image_url } = event {
        if !cache.update_image(profile_id, &image_url).await? {
            debug!("Profile {} not cached, skipping image update", profile_id);
        }
    }
    Ok(())
}

fn validate_update(update: &ProfileUpdate) -> Result<(), ValidationError> {
    if update.is_empty() {
        return Err(ValidationError::InvalidField {
            field: "update",
            reason: "at least one field must be set".to_string(),
        });
    }
    if let Some(days) = update.available_training_days {
        if !(1..=7).contains(&days) {
            return Err(ValidationError::InvalidField {
                field: "available_training_days",
                reason: format!("{} is outside 1-7", days),
            });
        }
    }
    if let Some(name) = &update.display_name {
        if name.trim().is_empty() {
            return Err(ValidationError::InvalidField {
                field: "display_name",
                reason: "must not be blank".to_string(),
            });
        }
    }
    Ok(())
}
