/// Profile synchronization
///
/// This module contains:
/// - An in-process event bus for profile changes
/// - The sync service that writes through to the remote store and keeps the local
///   profile cache consistent through bus subscriptions

pub mod event_bus;
pub mod service;


pub use event_bus::{EmitReport, EventBus, Listener, ProfileEvent, ProfileEventKind, Subscription};
pub use service::SyncService;
