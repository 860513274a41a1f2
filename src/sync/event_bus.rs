/// In-process publish/subscribe for profile changes
///
/// Listeners are registered per event kind and run in registration order on every
/// matching emit. A listener that errors or panics is logged and skipped; the
/// remaining listeners still receive the event. Nothing is persisted.

use crate::error::ServiceResult;
use crate::types::ProfileUpdate;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileEventKind {
    Updated,
    ImageUpdated,
    Deleted,
}

impl ProfileEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileEventKind::Updated => "profile_updated",
            ProfileEventKind::ImageUpdated => "profile_image_updated",
            ProfileEventKind::Deleted => "profile_deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProfileEvent {
    /// `changes: None` means listeners should refetch the whole profile
    Updated {
        profile_id: Uuid,
        changes: Option<ProfileUpdate>,
    },
    ImageUpdated {
        profile_id: Uuid,
        image_url: String,
    },
    Deleted {
        profile_id: Uuid,
    },
}

impl ProfileEvent {
    pub fn kind(&self) -> ProfileEventKind {
        match self {
            ProfileEvent::Updated { .. } => ProfileEventKind::Updated,
            ProfileEvent::ImageUpdated { .. } => ProfileEventKind::ImageUpdated,
            ProfileEvent::Deleted { .. } => ProfileEventKind::Deleted,
        }
    }

    pub fn profile_id(&self) -> Uuid {
        match self {
            ProfileEvent::Updated { profile_id, .. }
            | ProfileEvent::ImageUpdated { profile_id, .. }
            | ProfileEvent::Deleted { profile_id } => *profile_id,
        }
    }
}

pub type Listener = Arc<dyn Fn(ProfileEvent) -> BoxFuture<'static, ServiceResult<()>> + Send + Sync>;

type ListenerMap = Mutex<HashMap<ProfileEventKind, Vec<(u64, Listener)>>>;

/// Outcome of one emit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct EventBus {
    listeners: Arc<ListenerMap>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind
    pub fn on<F>(&self, kind: ProfileEventKind, listener: F) -> Subscription
    where
        F: Fn(ProfileEvent) -> BoxFuture<'static, ServiceResult<()>> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        lock(&self.listeners).entry(kind).or_default().push((id, listener));
        debug!("Subscribed listener {} to {}", id, kind.as_str());

        Subscription {
            kind,
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self, kind: ProfileEventKind) -> usize {
        lock(&self.listeners).get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Deliver `event` to every listener of its kind, one after another
    pub async fn emit(&self, event: ProfileEvent) -> EmitReport {
        let kind = event.kind();
        // Snapshot so listeners may subscribe or unsubscribe while running
        let listeners: Vec<(u64, Listener)> = lock(&self.listeners)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let mut report = EmitReport::default();
        for (id, listener) in listeners {
            let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| listener(event.clone()))) {
                Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
                Err(panic) => Err(panic),
            };

            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!("Listener {} failed handling {}: {}", id, kind.as_str(), e);
                    report.failed += 1;
                }
                Err(_) => {
                    warn!("Listener {} panicked handling {}", id, kind.as_str());
                    report.failed += 1;
                }
            }
        }

        debug!(
            "Emitted {} for {}: {} delivered, {} failed",
            kind.as_str(),
            event.profile_id(),
            report.delivered,
            report.failed
        );
        report
    }

    /// Drop every listener
    pub fn clear(&self) {
        lock(&self.listeners).clear();
    }
}

/// Handle returned by [`EventBus::on`]
#[must_use = "dropping a Subscription keeps the listener registered"]
pub struct Subscription {
    kind: ProfileEventKind,
    id: u64,
    listeners: Weak<ListenerMap>,
}

impl Subscription {
    pub fn kind(&self) -> ProfileEventKind {
        self.kind
    }

    /// Remove the listener. A no-op once the bus is gone.
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            if let Some(entries) = lock(&listeners).get_mut(&self.kind) {
                entries.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

// A panicking listener never holds this lock, so poisoning only follows a bug here.
fn lock(listeners: &ListenerMap) -> std::sync::MutexGuard<'_, HashMap<ProfileEventKind, Vec<(u64, Listener)>>> {
    listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
